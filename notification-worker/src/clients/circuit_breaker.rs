use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Error, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub call_timeout: Duration,
    pub error_threshold_pct: u32,
    pub reset_timeout: Duration,
    pub rolling_window: Duration,
    /// Minimum calls inside the window before the error rate is evaluated.
    pub min_calls: usize,
}

impl CircuitBreakerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            call_timeout: Duration::from_secs(config.circuit_breaker_call_timeout_seconds),
            error_threshold_pct: config.circuit_breaker_error_threshold_pct,
            reset_timeout: Duration::from_secs(config.circuit_breaker_reset_seconds),
            rolling_window: Duration::from_secs(config.circuit_breaker_window_seconds),
            min_calls: config.circuit_breaker_min_calls,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
}

enum Admission {
    Rejected,
    Probe,
    Normal,
}

/// In-process breaker guarding one external integration. Counters live
/// behind a lock; the guarded call itself runs outside it.
pub struct CircuitBreaker {
    service_name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(service_name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let service_name = service_name.into();
        info!(service = %service_name, "Circuit breaker initialized");

        Self {
            service_name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Run `operation` under the breaker. When open, fails synchronously
    /// without invoking it; a call exceeding the timeout counts as a failure.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let admission = self.admit();

        let probing = match admission {
            Admission::Rejected => {
                warn!(service = %self.service_name, "Circuit breaker is open, rejecting call");
                return Err(anyhow!("breaker_open: {}", self.service_name));
            }
            Admission::Probe => {
                info!(service = %self.service_name, "Circuit breaker half-open, probing");
                true
            }
            Admission::Normal => false,
        };

        let outcome = match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "{} call timed out after {:?}",
                self.service_name,
                self.config.call_timeout
            )),
        };

        self.record(outcome.is_ok(), probing);

        outcome
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::HalfOpen => Admission::Probe,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);

                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    fn record(&self, success: bool, probing: bool) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        if probing {
            if success {
                inner.state = CircuitState::Closed;
                inner.outcomes.clear();
                inner.opened_at = None;
                info!(service = %self.service_name, "Circuit breaker closed after successful probe");
            } else {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                warn!(service = %self.service_name, "Circuit breaker reopened after failed probe");
            }
            return;
        }

        inner.outcomes.push_back((now, success));
        while let Some(&(at, _)) = inner.outcomes.front() {
            if now.duration_since(at) > self.config.rolling_window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }

        let total = inner.outcomes.len();
        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();

        debug!(
            service = %self.service_name,
            total,
            failures,
            "Circuit breaker outcome recorded"
        );

        if inner.state == CircuitState::Closed
            && !success
            && total >= self.config.min_calls
            && failures * 100 >= self.config.error_threshold_pct as usize * total
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            warn!(
                service = %self.service_name,
                failures,
                total,
                "Circuit breaker opened, error rate over threshold"
            );
        }
    }
}
