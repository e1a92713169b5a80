use std::sync::Arc;

use anyhow::{Error, Result};

use notification_worker::clients::fcm::PushAdapter;
use notification_worker::config::Config;
use notification_worker::service;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    let adapter = Arc::new(PushAdapter::new(&config)?);

    service::run(config, adapter, "fcm").await
}
