use anyhow::{anyhow, Error, Result};
use dotenvy::dotenv;
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub redis_url: String,
    pub api_key: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,
    #[serde(default = "default_ttl_seconds")]
    pub status_ttl_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        Ok(config)
    }
}

fn default_port() -> u16 {
    8000
}

fn default_ttl_seconds() -> u64 {
    86400
}
