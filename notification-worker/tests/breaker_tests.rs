use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Error, Result};
use tokio::time::sleep;

use notification_worker::clients::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState,
};

fn config(min_calls: usize, reset: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        call_timeout: Duration::from_secs(5),
        error_threshold_pct: 60,
        reset_timeout: reset,
        rolling_window: Duration::from_secs(10),
        min_calls,
    }
}

async fn fail(breaker: &CircuitBreaker, calls: &Arc<AtomicU32>) -> Result<(), Error> {
    let counter = Arc::clone(calls);
    breaker
        .call(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("backend error"))
        })
        .await
}

async fn succeed(breaker: &CircuitBreaker, calls: &Arc<AtomicU32>) -> Result<(), Error> {
    let counter = Arc::clone(calls);
    breaker
        .call(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
}

/// Test: Failures below the volume floor never open the breaker
#[tokio::test]
async fn test_stays_closed_below_min_calls() -> Result<()> {
    let breaker = CircuitBreaker::new("smtp", config(10, Duration::from_secs(30)));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
        let _ = fail(&breaker, &calls).await;
    }

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    Ok(())
}

/// Test: Crossing the error rate threshold opens the breaker
#[tokio::test]
async fn test_opens_over_threshold_and_rejects() -> Result<()> {
    let breaker = CircuitBreaker::new("smtp", config(10, Duration::from_secs(30)));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..10 {
        let _ = fail(&breaker, &calls).await;
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 10);

    // The next call is rejected synchronously, without reaching the backend.
    let result = succeed(&breaker, &calls).await;
    let error = result.unwrap_err().to_string();
    assert!(error.contains("breaker_open"), "got: {}", error);
    assert_eq!(calls.load(Ordering::SeqCst), 10);

    Ok(())
}

/// Test: Mixed outcomes under the threshold leave the breaker closed
#[tokio::test]
async fn test_error_rate_under_threshold_stays_closed() -> Result<()> {
    let breaker = CircuitBreaker::new("smtp", config(5, Duration::from_secs(30)));
    let calls = Arc::new(AtomicU32::new(0));

    // 2 failures out of 5 calls: 40%, under the 60% threshold.
    succeed(&breaker, &calls).await?;
    succeed(&breaker, &calls).await?;
    succeed(&breaker, &calls).await?;
    let _ = fail(&breaker, &calls).await;
    let _ = fail(&breaker, &calls).await;

    assert_eq!(breaker.state(), CircuitState::Closed);

    Ok(())
}

/// Test: After the cooldown a probe is admitted and success closes the circuit
#[tokio::test]
async fn test_half_open_probe_success_closes() -> Result<()> {
    let breaker = CircuitBreaker::new("smtp", config(1, Duration::from_millis(50)));
    let calls = Arc::new(AtomicU32::new(0));

    let _ = fail(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    // Inside the cooldown the breaker still rejects.
    assert!(succeed(&breaker, &calls).await.is_err());

    sleep(Duration::from_millis(80)).await;

    succeed(&breaker, &calls).await?;
    assert_eq!(breaker.state(), CircuitState::Closed);

    // Fully recovered; further calls pass through.
    succeed(&breaker, &calls).await?;

    Ok(())
}

/// Test: A failed probe reopens the circuit
#[tokio::test]
async fn test_half_open_probe_failure_reopens() -> Result<()> {
    let breaker = CircuitBreaker::new("fcm", config(1, Duration::from_millis(50)));
    let calls = Arc::new(AtomicU32::new(0));

    let _ = fail(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    sleep(Duration::from_millis(80)).await;

    let _ = fail(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    // Rejected again until the next cooldown elapses.
    let before = calls.load(Ordering::SeqCst);
    assert!(succeed(&breaker, &calls).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), before);

    Ok(())
}

/// Test: A call exceeding the timeout is a failure
#[tokio::test]
async fn test_timeout_counts_as_failure() -> Result<()> {
    let breaker = CircuitBreaker::new(
        "smtp",
        CircuitBreakerConfig {
            call_timeout: Duration::from_millis(20),
            error_threshold_pct: 60,
            reset_timeout: Duration::from_secs(30),
            rolling_window: Duration::from_secs(10),
            min_calls: 1,
        },
    );

    let result: Result<(), Error> = breaker
        .call(|| async {
            sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

    let error = result.unwrap_err().to_string();
    assert!(error.contains("timed out"), "got: {}", error);
    assert_eq!(breaker.state(), CircuitState::Open);

    Ok(())
}
