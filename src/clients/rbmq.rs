use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::Config, models::event::Event, notifications::service::NotificationService,
    stores::EventPublisher, utils::process_message,
};

/// The event bus: consumes lifecycle queues and publishes derived events.
pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        for queue in [&config.user_events_queue, &config.room_events_queue] {
            channel
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
        }

        info!("RabbitMQ connection established, queues declared");

        Ok(Self {
            connection,
            channel,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn create_consumer(&self, queue: &str) -> Result<Consumer, Error> {
        let consumer_tag = format!("push_dispatcher_{}_{}", queue, Uuid::new_v4());

        let consumer = self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer for {}: {}", queue, e))?;

        info!(queue, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| anyhow!("Failed to reject message: {}", e))?;

        Ok(())
    }

    /// Feeds every delivery of `queue` to the notification service, one task
    /// per event, until `shutdown` fires or the consumer ends. Malformed
    /// events are rejected without requeue.
    pub async fn consume(
        self: Arc<Self>,
        queue: String,
        service: Arc<NotificationService>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Error> {
        let mut consumer = self.create_consumer(&queue).await?;

        loop {
            let delivery = tokio::select! {
                delivery = consumer.next() => delivery,
                _ = shutdown.changed() => break,
            };

            let delivery = match delivery {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    warn!(queue = %queue, error = %e, "Failed to receive delivery");
                    continue;
                }
                None => break,
            };

            let client = Arc::clone(&self);
            let service = Arc::clone(&service);

            tokio::spawn(async move {
                let tag = delivery.delivery_tag;

                let settled = match process_message(&delivery.data, &service).await {
                    Ok(_) => client.acknowledge(tag).await,
                    Err(e) => {
                        warn!(error = %e, "Dropping event");
                        client.reject(tag, false).await
                    }
                };

                if let Err(e) = settled {
                    warn!(error = %e, delivery_tag = tag, "Failed to settle delivery");
                }
            });
        }

        info!(queue = %queue, "Consumer stopped");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RabbitMqClient {
    async fn publish(&self, queue: &str, event: &Event) -> Result<(), Error> {
        let payload = serde_json::to_vec(event)?;

        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish event to {}: {}", queue, e))?;

        debug!(queue, event = %event.kind(), "Event published");

        Ok(())
    }
}
