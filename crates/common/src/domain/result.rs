use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Infrastructure failures surfaced by repositories and publishers.
///
/// Every variant is retryable: the stores these errors come from fail
/// transiently (connection refused, timeout, broker hiccup) and the
/// message-delivery layer owns the retry/dead-letter decision. Permanent
/// failures (bad payloads, absent data) never reach this type; they resolve
/// to a skipped outcome inside the enrichment service.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Report upload error: {0:#}")]
    ReportUpload(#[source] anyhow::Error),

    #[error("Repository error: {0:#}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Whether redelivering the triggering message could succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::ReportUpload(_) | DomainError::RepositoryError(_)
        )
    }
}
