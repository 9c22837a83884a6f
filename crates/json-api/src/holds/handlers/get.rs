//! Get Hold Handler

use std::sync::Arc;

use jiff::Timestamp;
use salvo::{
    oapi::{ToSchema, extract::PathParam},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use floodgate_app::domain::holds::models::Hold;

use crate::{extensions::*, holds::errors::into_status_error, state::State};

/// Hold Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct HoldResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u64,
    /// pending, consumed or expired
    pub status: String,
    pub expires_at: String,
    /// Pending and not yet past its deadline
    pub active: bool,
}

impl HoldResponse {
    fn new(hold: Hold, now: Timestamp) -> Self {
        Self {
            id: hold.uuid.into(),
            product_id: hold.product_uuid.into(),
            quantity: hold.quantity,
            status: hold.status.as_str().to_string(),
            expires_at: hold.expires_at.to_string(),
            active: hold.is_active(now),
        }
    }
}

/// Get Hold Handler
///
/// Returns a hold and whether it can still be converted into an order.
#[endpoint(
    tags("holds"),
    summary = "Get Hold",
    responses(
        (status_code = StatusCode::OK, description = "Hold found"),
        (status_code = StatusCode::NOT_FOUND, description = "Hold not found"),
    ),
)]
pub(crate) async fn handler(
    hold: PathParam<Uuid>,
    depot: &mut Depot,
) -> Result<Json<HoldResponse>, StatusError> {
    let state = depot.obtain_or_500::<Arc<State>>()?;

    let hold = state
        .app
        .holds
        .get_hold(hold.into_inner().into())
        .await
        .map_err(into_status_error)?;

    Ok(Json(HoldResponse::new(hold, Timestamp::now())))
}
