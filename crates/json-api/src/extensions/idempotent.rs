//! Idempotency-Key support for the write endpoints.
//!
//! The header is optional on `POST /holds` and `POST /orders`; when present,
//! duplicates replay the recorded response instead of re-running the
//! operation.

use salvo::prelude::{Json, Request, Response, StatusCode, StatusError};
use serde_json::Value;
use tracing::error;

use floodgate_app::domain::idempotency::models::{ResourceType, Slot, fingerprint};

use crate::state::State;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// How the handler should proceed after the slot claim.
pub(crate) enum IdempotentStart {
    /// Run the operation; `complete_idempotent` records the response when a
    /// key was supplied.
    Fresh(Option<String>),
    /// A duplicate: render the recorded response as-is.
    Replay { status: u16, body: Value },
}

pub(crate) async fn begin_idempotent(
    state: &State,
    req: &Request,
    resource: ResourceType,
    path: &str,
    body: &[u8],
) -> Result<IdempotentStart, StatusError> {
    let Some(key) = req.header::<String>(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(IdempotentStart::Fresh(None));
    };

    let fingerprint = fingerprint("POST", path, body);

    match state.app.idempotency.begin(&key, resource, &fingerprint).await {
        Ok(Slot::Fresh) => Ok(IdempotentStart::Fresh(Some(key))),
        Ok(Slot::Replayed { status, body }) => Ok(IdempotentStart::Replay { status, body }),
        Ok(Slot::KeyReuse) => Err(StatusError::conflict()
            .brief("Idempotency-Key was already used with a different payload")),
        Ok(Slot::Busy) => Err(StatusError::conflict()
            .brief("A request with this Idempotency-Key is being processed; retry shortly")),
        Err(error) => {
            error!("failed to claim idempotency slot: {error}");

            Err(StatusError::internal_server_error())
        }
    }
}

/// Record the response for replay. Best-effort: the client already has its
/// answer, so a failed recording is only logged.
pub(crate) async fn complete_idempotent(
    state: &State,
    key: Option<String>,
    resource: ResourceType,
    status: u16,
    body: &Value,
) {
    let Some(key) = key else {
        return;
    };

    if let Err(error) = state
        .app
        .idempotency
        .complete(&key, resource, status, body.clone())
        .await
    {
        error!("failed to complete idempotency record: {error}");
    }
}

/// Render a replayed response with its recorded status code.
pub(crate) fn render_replay(res: &mut Response, status: u16, body: Value) {
    res.status_code(StatusCode::from_u16(status).unwrap_or(StatusCode::OK));
    res.render(Json(body));
}
