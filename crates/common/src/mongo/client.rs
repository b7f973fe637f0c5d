use anyhow::{Context, Result};
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};
use tracing::debug;

/// Connection settings for the document store
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub auth_source: String,
    pub database: String,
    pub collection: String,
}

/// MongoDB client wrapper bound to one database/collection pair
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    database: String,
    collection: String,
}

impl MongoClient {
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        let uri = format!(
            "mongodb://{}:{}@{}:{}/?authSource={}",
            config.username, config.password, config.host, config.port, config.auth_source
        );

        let client = Client::with_uri_str(&uri)
            .await
            .context("failed to build MongoDB client")?;

        Ok(Self {
            client,
            database: config.database.clone(),
            collection: config.collection.clone(),
        })
    }

    /// Round-trips a ping command to verify connectivity
    pub async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        debug!("mongoDB connection successful");
        Ok(())
    }

    pub fn collection(&self) -> Collection<Document> {
        self.client
            .database(&self.database)
            .collection(&self.collection)
    }
}
