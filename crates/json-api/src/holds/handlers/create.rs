//! Create Hold Handler

use std::sync::Arc;

use salvo::{oapi::ToSchema, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use floodgate_app::domain::{
    holds::models::{Hold, NewHold},
    idempotency::models::ResourceType,
};

use crate::{extensions::*, holds::errors::into_status_error, state::State};

const PATH: &str = "/holds";

/// Create Hold Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct CreateHoldRequest {
    pub product_id: Uuid,
    pub quantity: u64,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl From<CreateHoldRequest> for NewHold {
    fn from(request: CreateHoldRequest) -> Self {
        NewHold {
            product_uuid: request.product_id.into(),
            quantity: request.quantity,
            session_id: request.session_id,
        }
    }
}

/// Hold Created Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct HoldCreatedResponse {
    /// Created hold UUID
    pub hold_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u64,
    /// Deadline after which the hold expires
    pub expires_at: String,
    pub expires_in_seconds: i64,
}

impl From<Hold> for HoldCreatedResponse {
    fn from(hold: Hold) -> Self {
        Self {
            hold_id: hold.uuid.into(),
            product_id: hold.product_uuid.into(),
            quantity: hold.quantity,
            expires_at: hold.expires_at.to_string(),
            expires_in_seconds: hold.expires_at.duration_since(hold.created_at).as_secs(),
        }
    }
}

/// Create Hold Handler
///
/// Reserves stock for a short window. Honors an optional `Idempotency-Key`
/// header.
#[endpoint(
    tags("holds"),
    summary = "Create Hold",
    responses(
        (status_code = StatusCode::CREATED, description = "Stock reserved"),
        (status_code = StatusCode::UNPROCESSABLE_ENTITY, description = "Insufficient stock, inactive or unknown product"),
        (status_code = StatusCode::CONFLICT, description = "Idempotency-Key conflict"),
        (status_code = StatusCode::TOO_MANY_REQUESTS, description = "Load shed"),
        (status_code = StatusCode::SERVICE_UNAVAILABLE, description = "Transient storage contention"),
    ),
)]
pub(crate) async fn handler(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), StatusError> {
    let state = depot.obtain_or_500::<Arc<State>>()?.clone();

    let body = req
        .payload()
        .await
        .map_err(|_| StatusError::bad_request().brief("Unreadable request body"))?
        .to_vec();

    let request: CreateHoldRequest = serde_json::from_slice(&body)
        .map_err(|_| StatusError::bad_request().brief("Invalid JSON body"))?;

    let key = match begin_idempotent(&state, req, ResourceType::Hold, PATH, &body).await? {
        IdempotentStart::Fresh(key) => key,
        IdempotentStart::Replay { status, body } => {
            render_replay(res, status, body);
            return Ok(());
        }
    };

    let hold = state
        .app
        .holds
        .reserve(request.into())
        .await
        .map_err(into_status_error)?;

    let response = HoldCreatedResponse::from(hold);
    let cached = serde_json::to_value(&response).or_500("failed to encode hold response")?;

    complete_idempotent(&state, key, ResourceType::Hold, 201, &cached).await;

    res.status_code(StatusCode::CREATED);
    res.render(Json(response));

    Ok(())
}

#[cfg(test)]
mod tests {
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::json;
    use testresult::TestResult;

    use floodgate_app::domain::{
        holds::{HoldsServiceError, MockHoldsService, models::HoldUuid},
        idempotency::{MockIdempotencyService, models::Slot},
        products::models::ProductUuid,
    };

    use crate::test_helpers::{holds_service, holds_with_idempotency_service, make_hold};

    use super::*;

    fn make_service(holds: MockHoldsService) -> Service {
        holds_service(holds, Router::with_path("holds").post(handler))
    }

    #[tokio::test]
    async fn test_create_hold_success() -> TestResult {
        let product = ProductUuid::new();
        let hold = make_hold(HoldUuid::new(), product);
        let hold_uuid = hold.uuid;

        let mut holds = MockHoldsService::new();

        holds
            .expect_reserve()
            .once()
            .withf(move |new_hold| {
                new_hold.product_uuid == product && new_hold.quantity == 2
            })
            .return_once(move |_| Ok(hold));

        let mut res = TestClient::post("http://example.com/holds")
            .json(&json!({ "product_id": product.into_uuid(), "quantity": 2 }))
            .send(&make_service(holds))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::CREATED));

        let body: HoldCreatedResponse = res.take_json().await?;
        assert_eq!(body.hold_id, hold_uuid.into_uuid());
        assert_eq!(body.product_id, product.into_uuid());
        assert_eq!(body.expires_in_seconds, 120);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_hold_insufficient_stock_returns_422() -> TestResult {
        let mut holds = MockHoldsService::new();

        holds.expect_reserve().once().return_once(|_| {
            Err(HoldsServiceError::InsufficientStock {
                available: 0,
                requested: 1,
            })
        });

        let res = TestClient::post("http://example.com/holds")
            .json(&json!({ "product_id": Uuid::now_v7(), "quantity": 1 }))
            .send(&make_service(holds))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::UNPROCESSABLE_ENTITY));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_hold_invalid_body_returns_400() -> TestResult {
        let holds = MockHoldsService::new();

        let res = TestClient::post("http://example.com/holds")
            .body("not json")
            .send(&make_service(holds))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_hold_replays_idempotent_duplicate() -> TestResult {
        let holds = MockHoldsService::new();
        let mut idempotency = MockIdempotencyService::new();

        idempotency.expect_begin().once().return_once(|_, _, _| {
            Ok(Slot::Replayed {
                status: 201,
                body: json!({ "hold_id": Uuid::nil() }),
            })
        });

        idempotency.expect_complete().never();

        let service = holds_with_idempotency_service(
            holds,
            idempotency,
            Router::with_path("holds").post(handler),
        );

        let mut res = TestClient::post("http://example.com/holds")
            .add_header("idempotency-key", "hk-1", true)
            .json(&json!({ "product_id": Uuid::now_v7(), "quantity": 1 }))
            .send(&service)
            .await;

        assert_eq!(res.status_code, Some(StatusCode::CREATED));

        let body: serde_json::Value = res.take_json().await?;
        assert_eq!(body["hold_id"], json!(Uuid::nil()));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_hold_records_fresh_idempotent_response() -> TestResult {
        let product = ProductUuid::new();
        let hold = make_hold(HoldUuid::new(), product);

        let mut holds = MockHoldsService::new();
        holds.expect_reserve().once().return_once(move |_| Ok(hold));

        let mut idempotency = MockIdempotencyService::new();

        idempotency
            .expect_begin()
            .once()
            .withf(|key, resource, _| key == "hk-2" && *resource == ResourceType::Hold)
            .return_once(|_, _, _| Ok(Slot::Fresh));

        idempotency
            .expect_complete()
            .once()
            .withf(|key, resource, status, _| {
                key == "hk-2" && *resource == ResourceType::Hold && *status == 201
            })
            .return_once(|_, _, _, _| Ok(()));

        let service = holds_with_idempotency_service(
            holds,
            idempotency,
            Router::with_path("holds").post(handler),
        );

        let res = TestClient::post("http://example.com/holds")
            .add_header("idempotency-key", "hk-2", true)
            .json(&json!({ "product_id": product.into_uuid(), "quantity": 1 }))
            .send(&service)
            .await;

        assert_eq!(res.status_code, Some(StatusCode::CREATED));

        Ok(())
    }
}
