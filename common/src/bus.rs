use anyhow::{anyhow, Error, Result};
use async_trait::async_trait;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel as AmqpChannel, Connection, ConnectionProperties, Consumer,
    ExchangeKind,
};
use tracing::{debug, info};

use crate::message::Channel;

pub const EXCHANGE_NAME: &str = "notifications.direct";
pub const FAILED_ROUTING_KEY: &str = "failed";
pub const FAILED_QUEUE: &str = "failed.queue";
pub const USER_CREATED_ROUTING_KEY: &str = "user.created";

/// Durable publish handle onto the direct exchange. The worker pipeline holds
/// one of these for retry republishes and dead-lettering; handing the handle
/// in (rather than the whole bus client) keeps the worker/bus dependency
/// one-directional and lets tests record publishes in memory.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: &[u8], priority: u8) -> Result<(), Error>;
}

pub struct RabbitMqBus {
    channel: AmqpChannel,
}

impl RabbitMqBus {
    /// Connect and declare the durable direct exchange. The lapin channel is
    /// clonable and safe to use from concurrent tasks.
    pub async fn connect(rabbitmq_url: &str) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .exchange_declare(
                EXCHANGE_NAME,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare exchange: {}", e))?;

        info!(exchange = EXCHANGE_NAME, "RabbitMQ channel ready");

        Ok(Self { channel })
    }

    /// Declare a durable queue and bind it to the exchange by routing key.
    pub async fn declare_and_bind(&self, queue: &str, routing_key: &str) -> Result<(), Error> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;

        self.channel
            .queue_bind(
                queue,
                EXCHANGE_NAME,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to bind queue {}: {}", queue, e))?;

        debug!(queue, routing_key, "Queue declared and bound");

        Ok(())
    }

    /// Declare the full worker topology for one channel: its own queue plus
    /// the shared dead-letter queue.
    pub async fn declare_worker_topology(&self, channel: Channel) -> Result<(), Error> {
        self.declare_and_bind(channel.queue(), channel.as_str())
            .await?;
        self.declare_and_bind(FAILED_QUEUE, FAILED_ROUTING_KEY).await
    }

    pub async fn set_prefetch(&self, prefetch_count: u16) -> Result<(), Error> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        Ok(())
    }

    pub async fn create_consumer(&self, queue: &str, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        info!(queue, consumer_tag, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl BusPublisher for RabbitMqBus {
    async fn publish(&self, routing_key: &str, payload: &[u8], priority: u8) -> Result<(), Error> {
        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_priority(priority),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish to {}: {}", routing_key, e))?;

        debug!(routing_key, bytes = payload.len(), "Message published");

        Ok(())
    }
}
