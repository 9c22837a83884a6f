//! Idempotency records: exactly-once semantics for retried writes.

pub mod errors;
pub mod models;
pub(crate) mod repository;
pub mod service;

pub use errors::IdempotencyServiceError;
pub use service::*;
