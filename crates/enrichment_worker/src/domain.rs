mod analytics;
mod enrichment_service;
mod envelope;

pub use analytics::*;
pub use enrichment_service::*;
pub use envelope::*;
