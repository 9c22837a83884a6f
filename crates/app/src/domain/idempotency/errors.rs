//! Idempotency service errors.

use sqlx::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdempotencyServiceError {
    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for IdempotencyServiceError {
    fn from(error: Error) -> Self {
        Self::Sql(error)
    }
}
