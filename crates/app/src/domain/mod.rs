//! Checkout Domain Concerns

pub mod holds;
pub mod idempotency;
pub mod orders;
pub mod products;
pub mod webhooks;
