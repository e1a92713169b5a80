use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notification_common::bus::{BusPublisher, FAILED_ROUTING_KEY};
use notification_common::message::{Channel, EnqueuedMessage, FailedRecord};
use notification_common::status::StatusRecord;
use notification_common::store::StatusStore;

use crate::channel::ChannelAdapter;
use crate::clients::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::renderer::TemplateCatalog;
use crate::utils::{retry_with_backoff, RetryConfig};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u64,
    pub idempotency_ttl_seconds: u64,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_retry_delay_ms: config.initial_retry_delay_ms,
            retry_backoff_multiplier: config.retry_backoff_multiplier,
            idempotency_ttl_seconds: config.idempotency_ttl_seconds,
        }
    }
}

/// Everything one channel worker needs to drive a delivery. Held behind
/// seams so tests can substitute in-memory fakes.
pub struct WorkerContext {
    pub channel: Channel,
    pub store: Arc<dyn StatusStore>,
    pub publisher: Arc<dyn BusPublisher>,
    pub adapter: Arc<dyn ChannelAdapter>,
    pub breaker: Arc<CircuitBreaker>,
    pub templates: TemplateCatalog,
    pub settings: PipelineSettings,
}

/// Terminal outcome of one delivery attempt. Whatever the outcome, the
/// consumer loop acks the originating delivery exactly once.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Structurally invalid payload; no retry value.
    Dropped { reason: String },
    /// Another delivery already owns or finished this request.
    Duplicate,
    Delivered,
    RetryScheduled { attempt: u32, delay: Duration },
    DeadLettered { error: String },
}

/// Delay before the kth retry: `initial · multiplier^(k−1)`.
pub fn retry_delay(settings: &PipelineSettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let multiplier = settings.retry_backoff_multiplier.saturating_pow(exponent);
    Duration::from_millis(settings.initial_retry_delay_ms.saturating_mul(multiplier))
}

/// Drive one bus delivery through the worker state machine:
/// decode → idempotency guard → validate → render → send through the
/// breaker → ack/retry/dead-letter.
pub async fn process_delivery(ctx: &WorkerContext, payload: &[u8]) -> DeliveryOutcome {
    let mut message: EnqueuedMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Dropping structurally invalid message");
            return DeliveryOutcome::Dropped {
                reason: e.to_string(),
            };
        }
    };

    if message.request.request_id.is_empty() {
        warn!("Dropping message without request_id");
        return DeliveryOutcome::Dropped {
            reason: "empty request_id".to_string(),
        };
    }

    if message.notification_id.is_none() {
        message.notification_id = Some(Uuid::new_v4().to_string());
    }
    let notification_id = message.notification_id.clone().unwrap_or_default();

    let key = ctx.channel.idempotency_key(&message.request.request_id);

    info!(
        request_id = %message.request.request_id,
        notification_id = %notification_id,
        attempts = message.attempts,
        "Processing delivery"
    );

    match claim(ctx, &key, &notification_id, message.attempts).await {
        Ok(true) => {}
        Ok(false) => {
            info!(request_id = %message.request.request_id, "Duplicate delivery, skipping");
            return DeliveryOutcome::Duplicate;
        }
        Err(e) => return fail(ctx, message, &key, e).await,
    }

    if let Err(e) = ctx.adapter.validate(&message) {
        return fail(ctx, message, &key, e).await;
    }

    let body = match ctx
        .templates
        .render(&message.request.template_code, &message.request.variables)
    {
        Ok(body) => body,
        Err(e) => return fail(ctx, message, &key, e).await,
    };

    let send_result = ctx
        .breaker
        .call(|| ctx.adapter.send(&message, &body))
        .await;

    match send_result {
        Ok(()) => {
            let record = StatusRecord::delivered(&notification_id);
            write_terminal_record(ctx, &key, &record).await;

            info!(
                request_id = %message.request.request_id,
                notification_id = %notification_id,
                "Notification delivered"
            );

            DeliveryOutcome::Delivered
        }
        Err(e) => fail(ctx, message, &key, e).await,
    }
}

/// Idempotency admission. A first delivery claims the key atomically; a
/// retry delivery only proceeds while no terminal record exists, then takes
/// ownership again. Returns `false` when the delivery is a duplicate.
async fn claim(
    ctx: &WorkerContext,
    key: &str,
    notification_id: &str,
    attempts: u32,
) -> Result<bool, Error> {
    let record = StatusRecord::processing(notification_id);
    let ttl = ctx.settings.idempotency_ttl_seconds;

    if attempts == 0 {
        return ctx.store.put_if_absent(key, &record, ttl).await;
    }

    match ctx.store.get(key).await? {
        Some(existing) if existing.status.is_terminal() => Ok(false),
        _ => {
            ctx.store.put(key, &record, ttl).await?;
            Ok(true)
        }
    }
}

/// Failure ladder: bump `attempts`, then either schedule an in-service
/// republish or dead-letter the message.
async fn fail(
    ctx: &WorkerContext,
    mut message: EnqueuedMessage,
    key: &str,
    error: Error,
) -> DeliveryOutcome {
    message.attempts += 1;
    let attempt = message.attempts;
    let reason = error.to_string();

    warn!(
        request_id = %message.request.request_id,
        attempt,
        max_attempts = ctx.settings.max_attempts,
        error = %reason,
        "Delivery attempt failed"
    );

    if attempt >= ctx.settings.max_attempts {
        return dead_letter(ctx, message, key, reason).await;
    }

    let delay = retry_delay(&ctx.settings, attempt);
    let routing_key = ctx.channel.as_str();

    match serde_json::to_vec(&message) {
        Ok(payload) => {
            let publisher = Arc::clone(&ctx.publisher);
            let priority = message.request.priority;
            let request_id = message.request.request_id.clone();

            // Spawned before the originating delivery is acked; the retried
            // message is a fresh delivery under the same request_id.
            tokio::spawn(async move {
                sleep(delay).await;
                if let Err(e) = publisher.publish(routing_key, &payload, priority).await {
                    error!(request_id = %request_id, error = %e, "Retry republish failed");
                } else {
                    debug!(request_id = %request_id, "Retry republished");
                }
            });

            DeliveryOutcome::RetryScheduled { attempt, delay }
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize retry payload");
            dead_letter(ctx, message, key, reason).await
        }
    }
}

/// Attempts exhausted: publish the FailedRecord, then write the terminal
/// `failed` status. The consumer acks only after both.
async fn dead_letter(
    ctx: &WorkerContext,
    message: EnqueuedMessage,
    key: &str,
    reason: String,
) -> DeliveryOutcome {
    let request_id = message.request.request_id.clone();
    let notification_id = message.notification_id.clone();
    let priority = message.request.priority;

    let failed = FailedRecord {
        message,
        error: reason.clone(),
        failed_at: Utc::now(),
    };

    match serde_json::to_vec(&failed) {
        Ok(payload) => {
            if let Err(e) = ctx
                .publisher
                .publish(FAILED_ROUTING_KEY, &payload, priority)
                .await
            {
                error!(request_id = %request_id, error = %e, "Dead-letter publish failed");
            }
        }
        Err(e) => error!(request_id = %request_id, error = %e, "Failed to serialize dead letter"),
    }

    let record = StatusRecord::failed(notification_id, reason.clone());
    write_terminal_record(ctx, key, &record).await;

    warn!(request_id = %request_id, error = %reason, "Message dead-lettered");

    DeliveryOutcome::DeadLettered { error: reason }
}

/// Terminal status writes get a short backoff ladder of their own; losing
/// one leaves a stale `processing` record until the TTL clears it.
async fn write_terminal_record(ctx: &WorkerContext, key: &str, record: &StatusRecord) {
    let result = retry_with_backoff(&RetryConfig::default(), || async {
        ctx.store
            .put(key, record, ctx.settings.idempotency_ttl_seconds)
            .await
    })
    .await;

    if let Err(e) = result {
        error!(key, status = %record.status, error = %e, "Terminal status write failed");
    }
}
