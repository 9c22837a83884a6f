//! Holds service errors.

use std::num::TryFromIntError;

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::database::is_serialization_failure;

#[derive(Debug, Error)]
pub enum HoldsServiceError {
    #[error("product not found")]
    ProductMissing,

    #[error("product is not active")]
    ProductInactive,

    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: u64, requested: u64 },

    #[error("quantity must be between 1 and {max}")]
    InvalidQuantity { max: u64 },

    #[error("hold not found")]
    NotFound,

    #[error("hold already consumed by an order")]
    AlreadyConsumed,

    #[error("storage error")]
    Sql(#[source] Error),

    #[error("invalid amount value")]
    InvalidAmount(#[from] TryFromIntError),
}

impl HoldsServiceError {
    /// Deadlock victims roll back cleanly; the whole operation can be re-run.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Sql(source) if is_serialization_failure(source))
    }
}

impl From<Error> for HoldsServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::ForeignKeyViolation) => Self::ProductMissing,
            Some(ErrorKind::UniqueViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation | ErrorKind::Other | _)
            | None => Self::Sql(error),
        }
    }
}
