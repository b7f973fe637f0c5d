mod analytics_repository;
mod client;

pub use analytics_repository::*;
pub use client::*;
