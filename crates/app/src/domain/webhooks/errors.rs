//! Webhooks service errors.

use std::num::TryFromIntError;

use sqlx::Error;
use thiserror::Error;

use crate::{
    database::is_serialization_failure,
    domain::orders::models::{OrderStatus, OrderUuid},
};

#[derive(Debug, Error)]
pub enum WebhooksServiceError {
    #[error("idempotency key is required")]
    MissingIdempotencyKey,

    #[error("webhook signature is required")]
    SignatureMissing,

    #[error("webhook signature is invalid")]
    SignatureInvalid,

    #[error("malformed payload")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid payload: {0}")]
    Invalid(&'static str),

    #[error("idempotency key reused with a different payload")]
    KeyReuse,

    #[error("a request with this idempotency key is already being processed")]
    Concurrent,

    #[error("order {order} already settled as {}", .status.as_str())]
    Conflict {
        order: OrderUuid,
        status: OrderStatus,
    },

    #[error("storage error")]
    Sql(#[source] Error),

    #[error("invalid amount value")]
    InvalidAmount(#[from] TryFromIntError),
}

impl WebhooksServiceError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Sql(source) if is_serialization_failure(source))
    }
}

impl From<Error> for WebhooksServiceError {
    fn from(error: Error) -> Self {
        Self::Sql(error)
    }
}
