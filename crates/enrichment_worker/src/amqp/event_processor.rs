use crate::domain::{EnrichmentService, EventOutcome};
use async_trait::async_trait;
use common::amqp::{ConsumeDecision, MessageProcessor};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bridges queue deliveries into the enrichment service and maps its
/// outcome onto an acknowledgement decision.
pub struct TransactionEventProcessor {
    service: Arc<EnrichmentService>,
}

impl TransactionEventProcessor {
    pub fn new(service: Arc<EnrichmentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageProcessor for TransactionEventProcessor {
    async fn process(&self, payload: &[u8]) -> ConsumeDecision {
        match self.service.process_event(payload).await {
            Ok(EventOutcome::Enriched {
                transaction_id,
                replay,
            }) => {
                debug!(transaction_id = %transaction_id, replay, "acknowledging enriched event");
                ConsumeDecision::Ack
            }
            Ok(EventOutcome::Skipped(reason)) => {
                debug!(reason = ?reason, "acknowledging skipped event");
                ConsumeDecision::Ack
            }
            Err(e) if e.is_retryable() => ConsumeDecision::Retry(e.to_string()),
            Err(e) => {
                warn!(error = %e, "acknowledging event after permanent failure");
                ConsumeDecision::Ack
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use common::domain::{
        DomainError, MockAnalyticsRepository, MockReportPublisher, MockTransactionRepository,
        ReportLocation, Transaction, UpsertOutcome,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    const TRANSACTION_ID: &str = "3f8c1d8e-9f2a-4b7c-8d1e-5a6b7c8d9e0f";

    fn event_payload() -> Vec<u8> {
        format!(r#"{{"payload": {{"transactionId": "{TRANSACTION_ID}"}}}}"#).into_bytes()
    }

    fn test_transaction() -> Transaction {
        Transaction {
            id: Uuid::parse_str(TRANSACTION_ID).unwrap(),
            customer_id: None,
            subtotal: dec!(10.00),
            tax: dec!(0.80),
            discount: dec!(0.00),
            total: dec!(10.80),
            currency: "USD".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            items: vec![],
        }
    }

    fn processor_with(
        transaction_repo: MockTransactionRepository,
        publisher: MockReportPublisher,
        analytics_repo: MockAnalyticsRepository,
    ) -> TransactionEventProcessor {
        TransactionEventProcessor::new(Arc::new(EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(publisher),
            Arc::new(analytics_repo),
        )))
    }

    #[tokio::test]
    async fn test_enriched_event_is_acked() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .times(1)
            .returning(|_| Ok(Some(test_transaction())));

        let mut publisher = MockReportPublisher::new();
        publisher.expect_publish_report().times(1).returning(|_| {
            Ok(ReportLocation {
                bucket: "analytics-reports".to_string(),
                object_key: format!("transactions/{TRANSACTION_ID}.json"),
                secure: false,
            })
        });

        let mut analytics_repo = MockAnalyticsRepository::new();
        analytics_repo
            .expect_upsert_analytics()
            .times(1)
            .returning(|_| Ok(UpsertOutcome::Inserted));

        let processor = processor_with(transaction_repo, publisher, analytics_repo);

        // Act
        let decision = processor.process(&event_payload()).await;

        // Assert
        assert_eq!(decision, ConsumeDecision::Ack);
    }

    #[tokio::test]
    async fn test_unprocessable_event_is_acked_not_retried() {
        // Arrange
        let processor = processor_with(
            MockTransactionRepository::new(),
            MockReportPublisher::new(),
            MockAnalyticsRepository::new(),
        );

        // Act
        let decision = processor.process(b"{not json").await;

        // Assert
        assert_eq!(decision, ConsumeDecision::Ack);
    }

    #[tokio::test]
    async fn test_infrastructure_failure_requests_retry() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow!("connection refused"))));

        let processor = processor_with(
            transaction_repo,
            MockReportPublisher::new(),
            MockAnalyticsRepository::new(),
        );

        // Act
        let decision = processor.process(&event_payload()).await;

        // Assert: the retry reason names the transaction and the cause
        match decision {
            ConsumeDecision::Retry(reason) => {
                assert!(reason.contains(TRANSACTION_ID));
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected Retry, got {:?}", other),
        }
    }
}
