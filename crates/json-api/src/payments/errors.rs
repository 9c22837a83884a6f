//! Payment Webhook Errors

use salvo::http::StatusError;
use tracing::error;

use floodgate_app::{database::is_serialization_failure, domain::webhooks::WebhooksServiceError};

pub(crate) fn into_status_error(error: WebhooksServiceError) -> StatusError {
    match error {
        WebhooksServiceError::SignatureMissing | WebhooksServiceError::SignatureInvalid => {
            StatusError::unauthorized().brief("Invalid webhook signature")
        }
        WebhooksServiceError::MissingIdempotencyKey => {
            StatusError::unprocessable_entity().brief("Idempotency-Key header is required")
        }
        WebhooksServiceError::Malformed(_) | WebhooksServiceError::Invalid(_) => {
            StatusError::unprocessable_entity().brief("Invalid webhook payload")
        }
        WebhooksServiceError::KeyReuse => StatusError::conflict()
            .brief("Idempotency-Key was already used with a different payload"),
        WebhooksServiceError::Concurrent => StatusError::conflict()
            .brief("A delivery with this Idempotency-Key is being processed; retry shortly"),
        WebhooksServiceError::Conflict { status, .. } => StatusError::conflict().brief(format!(
            "Order already settled as {}",
            status.as_str()
        )),
        WebhooksServiceError::Sql(source) if is_serialization_failure(&source) => {
            error!("webhook settlement kept deadlocking: {source}");

            StatusError::service_unavailable().brief("Busy, please retry")
        }
        WebhooksServiceError::Sql(source) => {
            error!("failed to process webhook: {source}");

            StatusError::internal_server_error()
        }
        WebhooksServiceError::InvalidAmount(_) => {
            StatusError::unprocessable_entity().brief("Invalid webhook payload")
        }
    }
}
