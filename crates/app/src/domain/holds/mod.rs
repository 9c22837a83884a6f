//! Stock holds: reservation engine and lifecycle sweep.

pub mod errors;
pub mod models;
pub(crate) mod repository;
pub mod service;
pub mod sweeper;

pub use errors::HoldsServiceError;
pub use service::*;
pub use sweeper::HoldSweeper;
