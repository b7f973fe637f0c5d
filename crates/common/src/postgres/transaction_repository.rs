use crate::domain::{
    DomainError, DomainResult, GetTransactionRepoInput, Transaction, TransactionItem,
    TransactionRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// PostgreSQL implementation of TransactionRepository.
///
/// Read-only: issues one lookup for the transaction header and one for its
/// line items against the collaborator-owned schema.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    client: PostgresClient,
}

impl PostgresTransactionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    #[instrument(skip(self, input), fields(transaction_id = %input.transaction_id))]
    async fn get_transaction(
        &self,
        input: GetTransactionRepoInput,
    ) -> DomainResult<Option<Transaction>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let header = conn
            .query_opt(
                "SELECT id, customer_id, subtotal, tax, discount, total, currency, created_at
                 FROM transactions
                 WHERE id = $1",
                &[&input.transaction_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let Some(header) = header else {
            debug!("no transaction row for id");
            return Ok(None);
        };

        let item_rows = conn
            .query(
                "SELECT product_id, name, category, unit_price, quantity
                 FROM transaction_items
                 WHERE transaction_id = $1",
                &[&input.transaction_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let items = item_rows
            .iter()
            .map(|row| TransactionItem {
                product_id: row.get(0),
                name: row.get(1),
                category: row.get(2),
                unit_price: row.get(3),
                quantity: i64::from(row.get::<_, i32>(4)),
            })
            .collect::<Vec<_>>();

        debug!(item_count = items.len(), "fetched transaction");

        // The producing service may omit currency; the original rows default
        // to USD.
        let currency: Option<String> = header.get(6);

        Ok(Some(Transaction {
            id: header.get(0),
            customer_id: header.get(1),
            subtotal: header.get(2),
            tax: header.get(3),
            discount: header.get(4),
            total: header.get(5),
            currency: currency.unwrap_or_else(|| "USD".to_string()),
            created_at: header.get(7),
            items,
        }))
    }
}
