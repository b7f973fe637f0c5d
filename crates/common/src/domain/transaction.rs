use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Canonical transaction record as committed by the checkout service.
/// The worker only ever reads these rows, never mutates them.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<TransactionItem>,
}

/// One line item of a transaction. `product_id` is an opaque identifier
/// assigned by the producing service, not necessarily a UUID.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionItem {
    pub product_id: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct GetTransactionRepoInput {
    pub transaction_id: Uuid,
}

/// Repository trait for read-only transaction lookups
/// Infrastructure layer (common::postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Fetch one transaction together with its line items.
    ///
    /// Returns None when no transaction exists for the id. Absence is a
    /// legitimate terminal outcome (the event raced the committing write or
    /// references an id that never existed), not an error.
    async fn get_transaction(
        &self,
        input: GetTransactionRepoInput,
    ) -> DomainResult<Option<Transaction>>;
}
