use std::sync::Arc;

use anyhow::{Error, Result};

use api_gateway::api::{run_server, AppState};
use api_gateway::config::Config;
use notification_common::bus::RabbitMqBus;
use notification_common::store::RedisStatusStore;

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

    let bus = RabbitMqBus::connect(&config.rabbitmq_url).await?;
    let store = RedisStatusStore::connect(&config.redis_url).await?;

    let state = AppState {
        config,
        store: Arc::new(store),
        publisher: Arc::new(bus),
    };

    run_server(state).await
}
