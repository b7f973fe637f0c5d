mod config;

use common::amqp::AmqpClient;
use common::minio::{MinioConfig, MinioReportPublisher};
use common::mongo::{MongoAnalyticsRepository, MongoClient, MongoConfig};
use common::postgres::{PostgresClient, PostgresConfig, PostgresTransactionRepository};
use common::telemetry::{init_telemetry, TelemetryConfig};
use config::ServiceConfig;
use enrichment_worker::{EnrichmentWorker, EnrichmentWorkerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        log_level: config.log_level.clone(),
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        queue = %config.queue,
        dead_letter_queue = %config.dead_letter_queue,
        "Starting analytics enrichment service"
    );

    let worker = match initialize_worker(&config).await {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize enrichment worker: {:#}", e);
            std::process::exit(1);
        }
    };

    let shutdown_token = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(shutdown_token.clone()));

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, stopping worker");
    shutdown_token.cancel();

    match worker_handle.await {
        Ok(Ok(())) => info!("Worker stopped cleanly"),
        Ok(Err(e)) => error!("Worker exited with error: {:#}", e),
        Err(e) => error!("Worker task panicked: {}", e),
    }
}

async fn initialize_worker(config: &ServiceConfig) -> anyhow::Result<EnrichmentWorker> {
    info!("Initializing PostgreSQL...");
    let postgres_client = PostgresClient::new(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
    })?;
    postgres_client.ping().await?;
    let transaction_repository = Arc::new(PostgresTransactionRepository::new(postgres_client));

    info!("Initializing MongoDB...");
    let mongo_client = MongoClient::connect(&MongoConfig {
        host: config.mongodb_host.clone(),
        port: config.mongodb_port,
        username: config.mongodb_username.clone(),
        password: config.mongodb_password.clone(),
        auth_source: config.mongodb_auth_source.clone(),
        database: config.mongodb_database.clone(),
        collection: config.mongodb_collection.clone(),
    })
    .await?;
    mongo_client.ping().await?;
    let analytics_repository = Arc::new(MongoAnalyticsRepository::new(&mongo_client));

    info!("Initializing MinIO...");
    let report_publisher = Arc::new(
        MinioReportPublisher::connect(&MinioConfig {
            endpoint: config.minio_endpoint.clone(),
            access_key: config.minio_access_key.clone(),
            secret_key: config.minio_secret_key.clone(),
            bucket: config.minio_bucket.clone(),
            secure: config.minio_secure,
        })
        .await?,
    );

    info!("Initializing RabbitMQ...");
    let amqp_client = AmqpClient::connect(&config.rabbitmq_url).await?;

    EnrichmentWorker::new(
        transaction_repository,
        report_publisher,
        analytics_repository,
        &amqp_client,
        EnrichmentWorkerConfig {
            queue: config.queue.clone(),
            dead_letter_queue: config.dead_letter_queue.clone(),
            prefetch_count: config.prefetch_count,
            max_delivery_attempts: config.max_delivery_attempts,
        },
    )
    .await
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
