pub mod amqp;
pub mod domain;
pub mod minio;
pub mod mongo;
pub mod postgres;
pub mod telemetry;
