use anyhow::{Context, Result};
use deadpool_lapin::{Manager, Pool};
use lapin::{Channel, ConnectionProperties};
use tracing::info;

/// AMQP connection wrapper with pooling
#[derive(Clone)]
pub struct AmqpClient {
    pool: Pool,
}

impl AmqpClient {
    /// Connects to the broker and verifies reachability before returning.
    /// The URL may carry credentials and is never logged.
    pub async fn connect(url: &str) -> Result<Self> {
        let manager = Manager::new(url.to_string(), ConnectionProperties::default());
        let pool = Pool::builder(manager)
            .max_size(4)
            .build()
            .context("failed to create AMQP connection pool")?;

        pool.get()
            .await
            .context("failed to connect to AMQP broker")?;

        info!("connected to AMQP broker");

        Ok(Self { pool })
    }

    /// Opens a fresh channel on a pooled connection
    pub async fn create_channel(&self) -> Result<Channel> {
        let conn = self
            .pool
            .get()
            .await
            .context("failed to get AMQP connection from pool")?;

        conn.create_channel()
            .await
            .context("failed to create AMQP channel")
    }
}
