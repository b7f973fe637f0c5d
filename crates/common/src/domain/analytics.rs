use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Analytics derived from a single transaction.
///
/// This is the deterministic part of the persisted document: it carries no
/// wall-clock fields and `category_breakdown` is ordered by category name,
/// so serializing the same transaction always yields identical bytes. The
/// report locator and the `generated_at`/`last_updated` stamps are attached
/// by the document store at persist time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionAnalytics {
    pub transaction_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub currency: String,
    pub totals: AnalyticsTotals,
    pub category_breakdown: Vec<CategorySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    /// Total quantity across all line items
    pub items: i64,
}

/// Revenue and quantity attributed to one item category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub revenue: Decimal,
    pub quantity: i64,
}

/// Location of the uploaded report object in blob storage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLocation {
    pub bucket: String,
    pub object_key: String,
    pub secure: bool,
}

/// Whether an upsert matched an existing document (replay) or created one
/// (first-time processing). Observability only, never control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone)]
pub struct UpsertAnalyticsRepoInput {
    pub analytics: TransactionAnalytics,
    pub report: ReportLocation,
}

/// Trait for publishing the rendered analytics report to blob storage
///
/// Implementations must use a key that is deterministic in the transaction
/// id and overwrite any existing object, so replays converge instead of
/// accumulating duplicates.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReportPublisher: Send + Sync {
    /// Upload the serialized analytics and return where it landed
    async fn publish_report(
        &self,
        analytics: &TransactionAnalytics,
    ) -> DomainResult<ReportLocation>;
}

/// Repository trait for the derived analytics document store
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Upsert the document keyed by transaction id, fully replacing any
    /// existing fields
    async fn upsert_analytics(
        &self,
        input: UpsertAnalyticsRepoInput,
    ) -> DomainResult<UpsertOutcome>;
}
