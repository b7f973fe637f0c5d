use crate::domain::{parse_event, EnvelopeError};
use common::domain::{
    AnalyticsRepository, DomainError, DomainResult, GetTransactionRepoInput, ReportPublisher,
    TransactionRepository, UpsertAnalyticsRepoInput, UpsertOutcome,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Terminal result of processing one event.
///
/// Skips are first-class outcomes, not errors: the event itself is beyond
/// repair and redelivering it cannot change anything, so the caller
/// acknowledges it either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Enriched {
        transaction_id: Uuid,
        /// True when the analytics document already existed (replayed event)
        replay: bool,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MalformedPayload,
    MissingTransactionId,
    InvalidTransactionId,
    TransactionNotFound,
}

/// Service that turns one transaction-completion event into a published
/// report and an upserted analytics document.
///
/// Processing is idempotent by transaction id: the report key and the
/// document key are both derived from it, so replays overwrite rather than
/// duplicate.
pub struct EnrichmentService {
    transaction_repository: Arc<dyn TransactionRepository>,
    report_publisher: Arc<dyn ReportPublisher>,
    analytics_repository: Arc<dyn AnalyticsRepository>,
}

impl EnrichmentService {
    pub fn new(
        transaction_repository: Arc<dyn TransactionRepository>,
        report_publisher: Arc<dyn ReportPublisher>,
        analytics_repository: Arc<dyn AnalyticsRepository>,
    ) -> Self {
        Self {
            transaction_repository,
            report_publisher,
            analytics_repository,
        }
    }

    /// Process one raw event payload to a terminal outcome.
    ///
    /// Unrepairable events resolve to `Ok(Skipped)`; only infrastructure
    /// failures (store, blob storage) surface as errors, and those are the
    /// retryable ones.
    #[instrument(skip(self, payload))]
    pub async fn process_event(&self, payload: &[u8]) -> DomainResult<EventOutcome> {
        let started = Instant::now();

        let envelope = match parse_event(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                let reason = match &e {
                    EnvelopeError::MalformedPayload(_) => SkipReason::MalformedPayload,
                    EnvelopeError::MissingTransactionId { .. } => SkipReason::MissingTransactionId,
                    EnvelopeError::InvalidTransactionId(_) => SkipReason::InvalidTransactionId,
                };
                warn!(error = %e, "skipping unprocessable event");
                return Ok(EventOutcome::Skipped(reason));
            }
        };

        let transaction_id = envelope.transaction_id;
        debug!(transaction_id = %transaction_id, event_type = ?envelope.event_type, "processing transaction event");

        let transaction = self
            .transaction_repository
            .get_transaction(GetTransactionRepoInput { transaction_id })
            .await
            .map_err(|e| retryable_failure(e, transaction_id, "transaction fetch"))?;

        let Some(transaction) = transaction else {
            warn!(transaction_id = %transaction_id, "transaction not found, skipping event");
            return Ok(EventOutcome::Skipped(SkipReason::TransactionNotFound));
        };

        let analytics = super::build_analytics(&transaction);

        let report = self
            .report_publisher
            .publish_report(&analytics)
            .await
            .map_err(|e| retryable_failure(e, transaction_id, "report upload"))?;

        let outcome = self
            .analytics_repository
            .upsert_analytics(UpsertAnalyticsRepoInput { analytics, report })
            .await
            .map_err(|e| retryable_failure(e, transaction_id, "document upsert"))?;

        let replay = outcome == UpsertOutcome::Updated;
        info!(
            transaction_id = %transaction_id,
            replay,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transaction enriched"
        );

        Ok(EventOutcome::Enriched {
            transaction_id,
            replay,
        })
    }
}

/// Logs a retryable infrastructure failure with the transaction it hit and
/// tags the propagated error with the id, so the redelivery path can name
/// the transaction without re-parsing the payload.
fn retryable_failure(e: DomainError, transaction_id: Uuid, stage: &str) -> DomainError {
    warn!(transaction_id = %transaction_id, stage, error = %e, "enrichment failed");

    let context = format!("transaction {transaction_id}");
    match e {
        DomainError::RepositoryError(err) => DomainError::RepositoryError(err.context(context)),
        DomainError::ReportUpload(err) => DomainError::ReportUpload(err.context(context)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use common::domain::{
        DomainError, MockAnalyticsRepository, MockReportPublisher, MockTransactionRepository,
        ReportLocation, Transaction, TransactionItem,
    };
    use rust_decimal_macros::dec;

    const TRANSACTION_ID: &str = "3f8c1d8e-9f2a-4b7c-8d1e-5a6b7c8d9e0f";

    fn event_payload() -> Vec<u8> {
        format!(
            r#"{{"event_type": "transaction.completed", "payload": {{"transactionId": "{TRANSACTION_ID}"}}}}"#
        )
        .into_bytes()
    }

    fn test_transaction() -> Transaction {
        Transaction {
            id: Uuid::parse_str(TRANSACTION_ID).unwrap(),
            customer_id: None,
            subtotal: dec!(25.00),
            tax: dec!(2.00),
            discount: dec!(0.00),
            total: dec!(27.00),
            currency: "USD".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            items: vec![TransactionItem {
                product_id: Some("prod-1".to_string()),
                name: "widget".to_string(),
                category: Some("electronics".to_string()),
                unit_price: dec!(12.50),
                quantity: 2,
            }],
        }
    }

    fn test_report_location() -> ReportLocation {
        ReportLocation {
            bucket: "analytics-reports".to_string(),
            object_key: format!("transactions/{TRANSACTION_ID}.json"),
            secure: false,
        }
    }

    #[tokio::test]
    async fn test_process_event_success() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .withf(|input| input.transaction_id.to_string() == TRANSACTION_ID)
            .times(1)
            .returning(|_| Ok(Some(test_transaction())));

        let mut publisher = MockReportPublisher::new();
        publisher
            .expect_publish_report()
            .withf(|analytics| analytics.transaction_id.to_string() == TRANSACTION_ID)
            .times(1)
            .returning(|_| Ok(test_report_location()));

        let mut analytics_repo = MockAnalyticsRepository::new();
        analytics_repo
            .expect_upsert_analytics()
            .withf(|input| input.report.object_key.contains(TRANSACTION_ID))
            .times(1)
            .returning(|_| Ok(UpsertOutcome::Inserted));

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(publisher),
            Arc::new(analytics_repo),
        );

        // Act
        let outcome = service.process_event(&event_payload()).await.unwrap();

        // Assert
        assert_eq!(
            outcome,
            EventOutcome::Enriched {
                transaction_id: Uuid::parse_str(TRANSACTION_ID).unwrap(),
                replay: false,
            }
        );
    }

    #[tokio::test]
    async fn test_process_event_replay_reports_updated_document() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .times(1)
            .returning(|_| Ok(Some(test_transaction())));

        let mut publisher = MockReportPublisher::new();
        publisher
            .expect_publish_report()
            .times(1)
            .returning(|_| Ok(test_report_location()));

        let mut analytics_repo = MockAnalyticsRepository::new();
        analytics_repo
            .expect_upsert_analytics()
            .times(1)
            .returning(|_| Ok(UpsertOutcome::Updated));

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(publisher),
            Arc::new(analytics_repo),
        );

        // Act
        let outcome = service.process_event(&event_payload()).await.unwrap();

        // Assert
        assert_eq!(
            outcome,
            EventOutcome::Enriched {
                transaction_id: Uuid::parse_str(TRANSACTION_ID).unwrap(),
                replay: true,
            }
        );
    }

    #[tokio::test]
    async fn test_process_event_transaction_not_found() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .times(1)
            .returning(|_| Ok(None));

        // Neither downstream store may be touched for a missing transaction
        let mut publisher = MockReportPublisher::new();
        publisher.expect_publish_report().times(0);

        let mut analytics_repo = MockAnalyticsRepository::new();
        analytics_repo.expect_upsert_analytics().times(0);

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(publisher),
            Arc::new(analytics_repo),
        );

        // Act
        let outcome = service.process_event(&event_payload()).await.unwrap();

        // Assert
        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::TransactionNotFound)
        );
    }

    #[tokio::test]
    async fn test_process_event_malformed_payload_skips_without_lookups() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_get_transaction().times(0);

        let mut publisher = MockReportPublisher::new();
        publisher.expect_publish_report().times(0);

        let mut analytics_repo = MockAnalyticsRepository::new();
        analytics_repo.expect_upsert_analytics().times(0);

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(publisher),
            Arc::new(analytics_repo),
        );

        // Act
        let outcome = service.process_event(b"{not json").await.unwrap();

        // Assert
        assert_eq!(outcome, EventOutcome::Skipped(SkipReason::MalformedPayload));
    }

    #[tokio::test]
    async fn test_process_event_invalid_transaction_id_skips() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_get_transaction().times(0);

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(MockReportPublisher::new()),
            Arc::new(MockAnalyticsRepository::new()),
        );

        // Act
        let outcome = service
            .process_event(br#"{"transactionId": "order-42"}"#)
            .await
            .unwrap();

        // Assert
        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::InvalidTransactionId)
        );
    }

    #[tokio::test]
    async fn test_process_event_missing_transaction_id_skips() {
        // Arrange
        let service = EnrichmentService::new(
            Arc::new(MockTransactionRepository::new()),
            Arc::new(MockReportPublisher::new()),
            Arc::new(MockAnalyticsRepository::new()),
        );

        // Act
        let outcome = service
            .process_event(br#"{"payload": {}}"#)
            .await
            .unwrap();

        // Assert
        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::MissingTransactionId)
        );
    }

    #[tokio::test]
    async fn test_process_event_propagates_repository_error() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow!("connection refused"))));

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(MockReportPublisher::new()),
            Arc::new(MockAnalyticsRepository::new()),
        );

        // Act
        let result = service.process_event(&event_payload()).await;

        // Assert: the propagated error names the transaction it hit
        let error = match result {
            Err(e @ DomainError::RepositoryError(_)) => e,
            other => panic!("expected RepositoryError, got {:?}", other),
        };
        assert!(error.to_string().contains(TRANSACTION_ID));
        assert!(error.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_process_event_propagates_report_upload_error() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .times(1)
            .returning(|_| Ok(Some(test_transaction())));

        let mut publisher = MockReportPublisher::new();
        publisher
            .expect_publish_report()
            .times(1)
            .returning(|_| Err(DomainError::ReportUpload(anyhow!("bucket unavailable"))));

        // Document must not be upserted when the report upload failed
        let mut analytics_repo = MockAnalyticsRepository::new();
        analytics_repo.expect_upsert_analytics().times(0);

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(publisher),
            Arc::new(analytics_repo),
        );

        // Act
        let result = service.process_event(&event_payload()).await;

        // Assert
        assert!(matches!(result, Err(DomainError::ReportUpload(_))));
    }

    #[tokio::test]
    async fn test_process_event_propagates_upsert_error() {
        // Arrange
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_get_transaction()
            .times(1)
            .returning(|_| Ok(Some(test_transaction())));

        let mut publisher = MockReportPublisher::new();
        publisher
            .expect_publish_report()
            .times(1)
            .returning(|_| Ok(test_report_location()));

        let mut analytics_repo = MockAnalyticsRepository::new();
        analytics_repo
            .expect_upsert_analytics()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow!("write concern timeout"))));

        let service = EnrichmentService::new(
            Arc::new(transaction_repo),
            Arc::new(publisher),
            Arc::new(analytics_repo),
        );

        // Act
        let result = service.process_event(&event_payload()).await;

        // Assert
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }
}
