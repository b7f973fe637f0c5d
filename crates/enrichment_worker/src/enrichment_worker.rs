use crate::amqp::TransactionEventProcessor;
use crate::domain::EnrichmentService;
use anyhow::Result;
use common::amqp::{AmqpClient, AmqpConsumer, AmqpConsumerConfig};
use common::domain::{AnalyticsRepository, ReportPublisher, TransactionRepository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct EnrichmentWorkerConfig {
    pub queue: String,
    pub dead_letter_queue: String,
    pub prefetch_count: u16,
    pub max_delivery_attempts: u32,
}

/// Assembled enrichment worker: the domain service wired to an AMQP
/// consumer on the transaction-completion queue.
pub struct EnrichmentWorker {
    consumer: AmqpConsumer,
    queue: String,
}

impl EnrichmentWorker {
    pub async fn new(
        transaction_repository: Arc<dyn TransactionRepository>,
        report_publisher: Arc<dyn ReportPublisher>,
        analytics_repository: Arc<dyn AnalyticsRepository>,
        amqp_client: &AmqpClient,
        config: EnrichmentWorkerConfig,
    ) -> Result<Self> {
        let service = Arc::new(EnrichmentService::new(
            transaction_repository,
            report_publisher,
            analytics_repository,
        ));
        let processor = Arc::new(TransactionEventProcessor::new(service));

        let queue = config.queue.clone();
        let consumer = AmqpConsumer::new(
            amqp_client,
            AmqpConsumerConfig {
                queue: config.queue,
                dead_letter_queue: config.dead_letter_queue,
                prefetch_count: config.prefetch_count,
                max_delivery_attempts: config.max_delivery_attempts,
            },
            processor,
        )
        .await?;

        Ok(Self { consumer, queue })
    }

    /// Consume until the token is cancelled
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        info!(queue = %self.queue, "starting enrichment worker");
        self.consumer.run(ctx).await
    }
}
