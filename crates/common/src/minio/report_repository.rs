use crate::domain::{DomainError, DomainResult, ReportLocation, ReportPublisher, TransactionAnalytics};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Connection settings for the object store
#[derive(Debug, Clone)]
pub struct MinioConfig {
    /// host:port, without scheme
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
}

/// MinIO implementation of ReportPublisher, speaking the S3 API.
///
/// Reports land at `transactions/{transaction_id}.json`; a PUT overwrites
/// any previous object under the same key.
pub struct MinioReportPublisher {
    client: Client,
    bucket: String,
    secure: bool,
}

impl MinioReportPublisher {
    pub async fn connect(config: &MinioConfig) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );

        let scheme = if config.secure { "https" } else { "http" };

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .endpoint_url(format!("{}://{}", scheme, config.endpoint))
            .force_path_style(true) // required for MinIO
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            secure: config.secure,
        })
    }

    /// Deterministic object key for a transaction's report
    fn object_key(transaction_id: Uuid) -> String {
        format!("transactions/{}.json", transaction_id)
    }
}

#[async_trait]
impl ReportPublisher for MinioReportPublisher {
    #[instrument(skip(self, analytics), fields(transaction_id = %analytics.transaction_id))]
    async fn publish_report(
        &self,
        analytics: &TransactionAnalytics,
    ) -> DomainResult<ReportLocation> {
        let object_key = Self::object_key(analytics.transaction_id);

        let body = serde_json::to_vec_pretty(analytics)
            .context("failed to serialize analytics report")
            .map_err(DomainError::ReportUpload)?;

        let size = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| DomainError::ReportUpload(anyhow!("report upload failed: {}", e)))?;

        debug!(
            bucket = %self.bucket,
            object_key = %object_key,
            size,
            "uploaded report object"
        );

        Ok(ReportLocation {
            bucket: self.bucket.clone(),
            object_key,
            secure: self.secure,
        })
    }
}
