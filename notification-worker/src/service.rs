use std::sync::Arc;

use anyhow::{anyhow, Error, Result};
use tracing::info;

use notification_common::bus::RabbitMqBus;
use notification_common::message::Channel;
use notification_common::store::RedisStatusStore;

use crate::api::{run_api_server, AppState};
use crate::channel::ChannelAdapter;
use crate::clients::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::clients::health::HealthChecker;
use crate::config::Config;
use crate::consumer::run_consumer;
use crate::pipeline::{PipelineSettings, WorkerContext};
use crate::renderer::TemplateCatalog;

/// Wire up one channel worker and run it: declare the bus topology, start
/// the status API, and drive the consumer loop until it fails.
pub async fn run(
    config: Config,
    adapter: Arc<dyn ChannelAdapter>,
    backend_name: &'static str,
) -> Result<(), Error> {
    let channel: Channel = adapter.channel();

    let bus = Arc::new(RabbitMqBus::connect(&config.rabbitmq_url).await?);
    bus.declare_worker_topology(channel).await?;
    bus.set_prefetch(config.prefetch_count).await?;

    let store = Arc::new(RedisStatusStore::connect(&config.redis_url).await?);

    let breaker = Arc::new(CircuitBreaker::new(
        backend_name,
        CircuitBreakerConfig::from_config(&config),
    ));

    let ctx = Arc::new(WorkerContext {
        channel,
        store: store.clone(),
        publisher: bus.clone(),
        adapter,
        breaker: breaker.clone(),
        templates: TemplateCatalog::default(),
        settings: PipelineSettings::from_config(&config),
    });

    let api_state = Arc::new(AppState {
        channel,
        store,
        health_checker: HealthChecker::new(config.clone(), breaker, backend_name),
    });

    info!(channel = %channel, "Worker starting");

    let api = tokio::spawn(run_api_server(api_state, config.service_port));
    let consumer = tokio::spawn(run_consumer(ctx, bus));

    // Either task ending is fatal; supervision restarts the process.
    tokio::select! {
        result = api => result.map_err(|e| anyhow!("API server task panicked: {}", e))?,
        result = consumer => result.map_err(|e| anyhow!("Consumer task panicked: {}", e))?,
    }
}
