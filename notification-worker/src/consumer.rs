use std::sync::Arc;

use anyhow::{anyhow, Error, Result};
use futures_util::StreamExt;
use tracing::{debug, error, info};

use notification_common::bus::RabbitMqBus;

use crate::pipeline::{process_delivery, DeliveryOutcome, WorkerContext};

/// Long-running consumer loop for one channel queue. Every delivery is acked
/// exactly once, after the pipeline has finished with it; a broken consumer
/// stream ends the loop and the process, leaving restart to supervision.
pub async fn run_consumer(ctx: Arc<WorkerContext>, bus: Arc<RabbitMqBus>) -> Result<(), Error> {
    let consumer_tag = format!("{}_worker", ctx.channel);
    let mut consumer = bus.create_consumer(ctx.channel.queue(), &consumer_tag).await?;

    info!(channel = %ctx.channel, "Worker consuming");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery.map_err(|e| anyhow!("Consumer stream failed: {}", e))?;

        let outcome = process_delivery(&ctx, &delivery.data).await;

        match &outcome {
            DeliveryOutcome::Dropped { reason } => {
                debug!(reason = %reason, "Acking structurally invalid message")
            }
            DeliveryOutcome::Duplicate => debug!("Acking duplicate delivery"),
            DeliveryOutcome::Delivered => debug!("Acking delivered message"),
            DeliveryOutcome::RetryScheduled { attempt, delay } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Acking, retry scheduled")
            }
            DeliveryOutcome::DeadLettered { error } => {
                debug!(error = %error, "Acking dead-lettered message")
            }
        }

        if let Err(e) = bus.acknowledge(delivery.delivery_tag).await {
            error!(error = %e, "Failed to ack delivery");
            return Err(e);
        }
    }

    Err(anyhow!("Consumer stream for {} ended", ctx.channel.queue()))
}
