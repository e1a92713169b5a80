use anyhow::{anyhow, Error, Result};
use dotenvy::dotenv;
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub redis_url: String,

    #[serde(default = "default_service_port")]
    pub service_port: u16,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    #[serde(default = "default_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_breaker_call_timeout_seconds")]
    pub circuit_breaker_call_timeout_seconds: u64,
    #[serde(default = "default_breaker_error_threshold_pct")]
    pub circuit_breaker_error_threshold_pct: u32,
    #[serde(default = "default_breaker_reset_seconds")]
    pub circuit_breaker_reset_seconds: u64,
    #[serde(default = "default_breaker_window_seconds")]
    pub circuit_breaker_window_seconds: u64,
    #[serde(default = "default_breaker_min_calls")]
    pub circuit_breaker_min_calls: usize,

    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub email_from: Option<String>,

    pub firebase_project_id: Option<String>,
    pub firebase_client_email: Option<String>,
    pub firebase_private_key: Option<String>,
    /// Overrides the URL derived from `firebase_project_id`.
    pub fcm_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        Ok(config)
    }
}

fn default_service_port() -> u16 {
    8081
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_ttl_seconds() -> u64 {
    86400
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    2000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_breaker_call_timeout_seconds() -> u64 {
    10
}

fn default_breaker_error_threshold_pct() -> u32 {
    60
}

fn default_breaker_reset_seconds() -> u64 {
    30
}

fn default_breaker_window_seconds() -> u64 {
    10
}

fn default_breaker_min_calls() -> usize {
    10
}

fn default_smtp_port() -> u16 {
    587
}
