//! Order Errors

use salvo::http::StatusError;
use tracing::error;

use floodgate_app::{database::is_serialization_failure, domain::orders::OrdersServiceError};

pub(crate) fn into_status_error(error: OrdersServiceError) -> StatusError {
    match error {
        OrdersServiceError::HoldMissing => {
            StatusError::unprocessable_entity().brief("Unknown hold")
        }
        OrdersServiceError::HoldExpired => {
            StatusError::unprocessable_entity().brief("Hold has expired")
        }
        OrdersServiceError::HoldAlreadyConsumed => {
            StatusError::unprocessable_entity().brief("Hold already consumed by an order")
        }
        OrdersServiceError::NotFound => StatusError::not_found().brief("Order not found"),
        OrdersServiceError::Sql(source) if is_serialization_failure(&source) => {
            error!("order creation kept deadlocking: {source}");

            StatusError::service_unavailable().brief("Busy, please retry")
        }
        OrdersServiceError::Sql(source) => {
            error!("failed to process order: {source}");

            StatusError::internal_server_error()
        }
        OrdersServiceError::InvalidAmount(_) => {
            StatusError::bad_request().brief("Invalid order payload")
        }
    }
}
