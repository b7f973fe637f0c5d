mod client;
mod transaction_repository;

pub use client::*;
pub use transaction_repository::*;
