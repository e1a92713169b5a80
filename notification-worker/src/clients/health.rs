use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};

use notification_common::bus::RabbitMqBus;

use crate::clients::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::Config;
use crate::models::health::{HealthCheckResponse, HealthStatus, ServiceHealth};

pub struct HealthChecker {
    config: Config,
    breaker: Arc<CircuitBreaker>,
    backend_name: &'static str,
}

impl HealthChecker {
    pub fn new(config: Config, breaker: Arc<CircuitBreaker>, backend_name: &'static str) -> Self {
        Self {
            config,
            breaker,
            backend_name,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("status_store".to_string(), self.check_redis().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq().await);
        checks.insert(self.backend_name.to_string(), self.check_breaker());

        let status = overall_status(&checks);

        HealthCheckResponse {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        let client = match redis::Client::open(self.config.redis_url.as_str()) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Redis client creation failed");
                return ServiceHealth::unhealthy(format!("Client creation failed: {}", e));
            }
        };

        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!(response_time_ms = elapsed, "Redis health check passed");
                    ServiceHealth::healthy(elapsed)
                }
                Err(e) => {
                    warn!(error = %e, "Redis ping failed");
                    ServiceHealth::unhealthy(format!("Ping failed: {}", e))
                }
            },
            Err(e) => {
                warn!(error = %e, "Redis connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {}", e))
            }
        }
    }

    async fn check_rabbitmq(&self) -> ServiceHealth {
        let start = Instant::now();

        match RabbitMqBus::connect(&self.config.rabbitmq_url).await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "RabbitMQ health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "RabbitMQ connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {}", e))
            }
        }
    }

    fn check_breaker(&self) -> ServiceHealth {
        let state = self.breaker.state();
        let state_str = state.as_str().to_string();

        match state {
            CircuitState::Closed => ServiceHealth {
                status: HealthStatus::Healthy,
                response_time_ms: None,
                circuit_breaker: Some(state_str),
                error: None,
            },
            CircuitState::HalfOpen => ServiceHealth::degraded(
                state_str,
                "Circuit breaker in recovery mode".to_string(),
            ),
            CircuitState::Open => ServiceHealth::degraded(
                state_str,
                "Circuit breaker open, backend calls rejected".to_string(),
            ),
        }
    }
}

fn overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let has_unhealthy = checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy);
    let has_degraded = checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded);

    if has_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
