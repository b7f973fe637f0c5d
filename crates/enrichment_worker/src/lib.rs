pub mod amqp;
pub mod domain;
pub mod enrichment_worker;

pub use enrichment_worker::*;
