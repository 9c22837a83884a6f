//! Release Hold Handler

use std::sync::Arc;

use salvo::{
    oapi::{ToSchema, extract::PathParam},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{extensions::*, holds::errors::into_status_error, state::State};

/// Hold Released Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct HoldReleasedResponse {
    pub released: bool,
}

/// Release Hold Handler
///
/// Expires a pending hold and returns its stock. Idempotent: releasing an
/// already-expired hold succeeds without effect.
#[endpoint(
    tags("holds"),
    summary = "Release Hold",
    responses(
        (status_code = StatusCode::OK, description = "Hold released (or already expired)"),
        (status_code = StatusCode::NOT_FOUND, description = "Hold not found"),
        (status_code = StatusCode::UNPROCESSABLE_ENTITY, description = "Hold already consumed"),
    ),
)]
pub(crate) async fn handler(
    hold: PathParam<Uuid>,
    depot: &mut Depot,
) -> Result<Json<HoldReleasedResponse>, StatusError> {
    let state = depot.obtain_or_500::<Arc<State>>()?;

    state
        .app
        .holds
        .release(hold.into_inner().into())
        .await
        .map_err(into_status_error)?;

    Ok(Json(HoldReleasedResponse { released: true }))
}
