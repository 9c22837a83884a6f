//! Orders service errors.

use std::num::TryFromIntError;

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::database::is_serialization_failure;

#[derive(Debug, Error)]
pub enum OrdersServiceError {
    #[error("hold not found")]
    HoldMissing,

    #[error("hold has expired")]
    HoldExpired,

    #[error("hold already consumed by an order")]
    HoldAlreadyConsumed,

    #[error("order not found")]
    NotFound,

    #[error("storage error")]
    Sql(#[source] Error),

    #[error("invalid amount value")]
    InvalidAmount(#[from] TryFromIntError),
}

impl OrdersServiceError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Sql(source) if is_serialization_failure(source))
    }
}

impl From<Error> for OrdersServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            // The UNIQUE constraint on the hold reference loses only to a
            // racing order for the same hold.
            Some(ErrorKind::UniqueViolation) => Self::HoldAlreadyConsumed,
            Some(ErrorKind::ForeignKeyViolation) => Self::HoldMissing,
            Some(ErrorKind::NotNullViolation | ErrorKind::CheckViolation | ErrorKind::Other | _)
            | None => Self::Sql(error),
        }
    }
}
