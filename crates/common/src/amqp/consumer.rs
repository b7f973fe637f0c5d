use crate::amqp::AmqpClient;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CONSUMER_TAG: &str = "analytics-enrichment";
const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// Terminal decision for one delivery, produced by the processor.
///
/// `Ack` covers both successful processing and permanent skips; `Retry`
/// means a retryable infrastructure failure where broker redelivery is the
/// recovery mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeDecision {
    Ack,
    Retry(String),
}

/// Trait for processing a single queue delivery to a terminal decision.
/// The consumer never acknowledges before this returns.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, payload: &[u8]) -> ConsumeDecision;
}

/// Broker action derived from a decision and the delivery's attempt budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAction {
    Ack,
    Requeue,
    DeadLetter,
}

pub struct AmqpConsumerConfig {
    pub queue: String,
    pub dead_letter_queue: String,
    /// Flow-control bound: maximum unacknowledged deliveries in flight
    pub prefetch_count: u16,
    /// Total delivery attempts before a message is dead-lettered
    pub max_delivery_attempts: u32,
}

/// Sequential AMQP consumer.
///
/// Processes one delivery to a terminal state before touching the next;
/// throughput scales by running more consumer instances against the same
/// queue, not by intra-instance concurrency. The work queue is declared as
/// a quorum queue so the broker stamps redeliveries with a delivery count,
/// which carries the retry budget across nack/requeue cycles.
pub struct AmqpConsumer {
    channel: Channel,
    consumer: lapin::Consumer,
    queue: String,
    dead_letter_queue: String,
    max_delivery_attempts: u32,
    processor: Arc<dyn MessageProcessor>,
}

impl AmqpConsumer {
    pub async fn new(
        client: &AmqpClient,
        config: AmqpConsumerConfig,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<Self> {
        let channel = client.create_channel().await?;

        // Dead-letter publishes must survive the ack of the original, so
        // the channel runs in publisher-confirm mode.
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .context("failed to enable publisher confirms")?;

        let mut arguments = FieldTable::default();
        arguments.insert(
            ShortString::from("x-queue-type"),
            AMQPValue::LongString("quorum".into()),
        );

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .context("failed to declare work queue")?;

        channel
            .queue_declare(
                &config.dead_letter_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("failed to declare dead-letter queue")?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .context("failed to set prefetch limit")?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("failed to start consuming")?;

        debug!(
            queue = %config.queue,
            dead_letter_queue = %config.dead_letter_queue,
            prefetch = config.prefetch_count,
            "AMQP consumer created"
        );

        Ok(Self {
            channel,
            consumer,
            queue: config.queue,
            dead_letter_queue: config.dead_letter_queue,
            max_delivery_attempts: config.max_delivery_attempts,
            processor,
        })
    }

    /// Run the consumer loop until cancellation
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(queue = %self.queue, "starting AMQP consumer");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(queue = %self.queue, "received shutdown signal, stopping consumer");
                    break;
                }
                delivery = self.consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            if let Err(e) = self.handle_delivery(delivery).await {
                                error!(queue = %self.queue, error = %e, "error handling delivery");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                        Some(Err(e)) => {
                            error!(queue = %self.queue, error = %e, "consumer stream error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        None => {
                            warn!(queue = %self.queue, "consumer stream closed by broker");
                            break;
                        }
                    }
                }
            }
        }

        debug!(queue = %self.queue, "consumer stopped gracefully");
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<()> {
        let started = Instant::now();

        let decision = self.processor.process(&delivery.data).await;

        let attempts = delivery_attempts(delivery.properties.headers().as_ref());
        let action = next_action(&decision, attempts, self.max_delivery_attempts);

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            attempts,
            action = ?action,
            "processed delivery"
        );

        match action {
            DeliveryAction::Ack => {
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .context("failed to acknowledge delivery")?;
            }
            DeliveryAction::Requeue => {
                if let ConsumeDecision::Retry(reason) = &decision {
                    warn!(
                        attempts,
                        max_attempts = self.max_delivery_attempts,
                        reason = %reason,
                        "requeueing delivery after retryable failure"
                    );
                }
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
                    .context("failed to requeue delivery")?;
            }
            DeliveryAction::DeadLetter => {
                if let ConsumeDecision::Retry(reason) = &decision {
                    error!(
                        attempts,
                        max_attempts = self.max_delivery_attempts,
                        reason = %reason,
                        dead_letter_queue = %self.dead_letter_queue,
                        "retry budget exhausted, dead-lettering delivery"
                    );
                }
                self.publish_dead_letter(&delivery.data).await?;
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .context("failed to acknowledge dead-lettered delivery")?;
            }
        }

        Ok(())
    }

    async fn publish_dead_letter(&self, payload: &[u8]) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.dead_letter_queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // persistent
            )
            .await
            .context("failed to publish to dead-letter queue")?;

        let confirmation = confirm
            .await
            .context("dead-letter publish was not confirmed")?;

        ensure_broker_acked(confirmation)
    }
}

/// A dead-letter publish only counts once the broker positively confirms
/// it; a nack or an unconfirmed publish means the payload may not be queued
/// and the original delivery must stay unacknowledged.
fn ensure_broker_acked(confirmation: Confirmation) -> Result<()> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(anyhow!("dead-letter publish nacked by broker")),
        Confirmation::NotRequested => {
            Err(anyhow!("publisher confirms not enabled on channel"))
        }
    }
}

/// Number of times this delivery has been attempted, this one included.
/// Quorum queues stamp redeliveries with `x-delivery-count`; the first
/// delivery carries no header.
pub(crate) fn delivery_attempts(headers: Option<&FieldTable>) -> u32 {
    let redeliveries = headers
        .and_then(|table| table.inner().get(&ShortString::from(DELIVERY_COUNT_HEADER)))
        .map(|value| match value {
            AMQPValue::LongLongInt(n) => (*n).max(0) as u32,
            AMQPValue::LongInt(n) => (*n).max(0) as u32,
            AMQPValue::LongUInt(n) => *n,
            AMQPValue::ShortShortInt(n) => (*n).max(0) as u32,
            AMQPValue::ShortInt(n) => (*n).max(0) as u32,
            AMQPValue::ShortUInt(n) => u32::from(*n),
            _ => 0,
        })
        .unwrap_or(0);

    redeliveries + 1
}

/// Maps the processor decision and the attempt count onto exactly one
/// broker action
pub(crate) fn next_action(
    decision: &ConsumeDecision,
    attempts: u32,
    max_attempts: u32,
) -> DeliveryAction {
    match decision {
        ConsumeDecision::Ack => DeliveryAction::Ack,
        ConsumeDecision::Retry(_) if attempts >= max_attempts => DeliveryAction::DeadLetter,
        ConsumeDecision::Retry(_) => DeliveryAction::Requeue,
    }
}
