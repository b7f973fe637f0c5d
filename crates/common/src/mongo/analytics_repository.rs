use crate::domain::{
    AnalyticsRepository, DomainError, DomainResult, UpsertAnalyticsRepoInput, UpsertOutcome,
};
use crate::mongo::MongoClient;
use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, to_bson, to_document, Document};
use mongodb::Collection;
use tracing::{debug, instrument};

/// MongoDB implementation of AnalyticsRepository.
///
/// One document per transaction id; `$set` with upsert fully replaces the
/// tracked fields, so a replay converges on the same document instead of
/// duplicating it.
pub struct MongoAnalyticsRepository {
    collection: Collection<Document>,
}

impl MongoAnalyticsRepository {
    pub fn new(client: &MongoClient) -> Self {
        Self {
            collection: client.collection(),
        }
    }
}

#[async_trait]
impl AnalyticsRepository for MongoAnalyticsRepository {
    #[instrument(skip(self, input), fields(transaction_id = %input.analytics.transaction_id))]
    async fn upsert_analytics(
        &self,
        input: UpsertAnalyticsRepoInput,
    ) -> DomainResult<UpsertOutcome> {
        let transaction_id = input.analytics.transaction_id.to_string();
        let document =
            analytics_document(&input).map_err(|e| DomainError::RepositoryError(e.into()))?;

        let result = self
            .collection
            .update_one(
                doc! { "transaction_id": &transaction_id },
                doc! { "$set": document },
            )
            .upsert(true)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let outcome = if result.matched_count > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };

        debug!(
            action = match outcome {
                UpsertOutcome::Updated => "updated",
                UpsertOutcome::Inserted => "inserted",
            },
            "stored analytics document"
        );

        Ok(outcome)
    }
}

/// Renders the full document: deterministic analytics fields, the report
/// locator, and the persist-time stamps.
fn analytics_document(
    input: &UpsertAnalyticsRepoInput,
) -> mongodb::bson::ser::Result<Document> {
    let mut document = to_document(&input.analytics)?;
    document.insert("report", to_bson(&input.report)?);

    let now = Utc::now().to_rfc3339();
    document.insert("generated_at", now.clone());
    document.insert("last_updated", now);

    Ok(document)
}
