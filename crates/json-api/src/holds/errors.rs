//! Hold Errors

use salvo::http::StatusError;
use tracing::error;

use floodgate_app::{database::is_serialization_failure, domain::holds::HoldsServiceError};

pub(crate) fn into_status_error(error: HoldsServiceError) -> StatusError {
    match error {
        HoldsServiceError::ProductMissing => {
            StatusError::unprocessable_entity().brief("Unknown product")
        }
        HoldsServiceError::ProductInactive => {
            StatusError::unprocessable_entity().brief("Product is not available for sale")
        }
        HoldsServiceError::InsufficientStock { available, .. } => {
            StatusError::unprocessable_entity()
                .brief(format!("Insufficient stock: {available} available"))
        }
        HoldsServiceError::InvalidQuantity { max } => StatusError::unprocessable_entity()
            .brief(format!("Quantity must be between 1 and {max}")),
        HoldsServiceError::NotFound => StatusError::not_found().brief("Hold not found"),
        HoldsServiceError::AlreadyConsumed => {
            StatusError::unprocessable_entity().brief("Hold already consumed by an order")
        }
        HoldsServiceError::Sql(source) if is_serialization_failure(&source) => {
            error!("reservation kept deadlocking: {source}");

            StatusError::service_unavailable().brief("Busy, please retry")
        }
        HoldsServiceError::Sql(source) => {
            error!("failed to process hold: {source}");

            StatusError::internal_server_error()
        }
        HoldsServiceError::InvalidAmount(_) => {
            StatusError::bad_request().brief("Invalid hold payload")
        }
    }
}
