//! Create Order Handler

use std::sync::Arc;

use salvo::{oapi::ToSchema, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use floodgate_app::domain::{
    idempotency::models::ResourceType,
    orders::models::{NewOrder, Order, OrderUuid},
};

use crate::{extensions::*, orders::errors::into_status_error, state::State};

const PATH: &str = "/orders";

/// Create Order Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct CreateOrderRequest {
    pub hold_id: Uuid,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<Value>,
}

/// Order Created Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct OrderCreatedResponse {
    /// Created order UUID
    pub order_id: Uuid,
    /// pending, or already settled by an absorbed callback
    pub status: String,
    /// Total amount in minor units
    pub amount: u64,
    pub product_id: Uuid,
    pub quantity: u64,
    pub created_at: String,
}

impl From<Order> for OrderCreatedResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.uuid.into(),
            status: order.status.as_str().to_string(),
            amount: order.total_amount,
            product_id: order.product_uuid.into(),
            quantity: order.quantity,
            created_at: order.created_at.to_string(),
        }
    }
}

/// Create Order Handler
///
/// Converts a pending hold into an order, then applies any payment callbacks
/// that arrived ahead of it. Honors an optional `Idempotency-Key` header.
#[endpoint(
    tags("orders"),
    summary = "Create Order",
    responses(
        (status_code = StatusCode::CREATED, description = "Order created"),
        (status_code = StatusCode::UNPROCESSABLE_ENTITY, description = "Hold missing, expired or consumed"),
        (status_code = StatusCode::CONFLICT, description = "Idempotency-Key conflict"),
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

    let request: CreateOrderRequest = serde_json::from_slice(&body)
        .map_err(|_| StatusError::bad_request().brief("Invalid JSON body"))?;

    let key = match begin_idempotent(&state, req, ResourceType::Order, PATH, &body).await? {
        IdempotentStart::Fresh(key) => key,
        IdempotentStart::Replay { status, body } => {
            render_replay(res, status, body);
            return Ok(());
        }
    };

    let order = state
        .app
        .orders
        .create_order(NewOrder {
            uuid: OrderUuid::new(),
            hold_uuid: request.hold_id.into(),
            customer_email: request.customer_email,
            customer_details: request.customer_details,
        })
        .await
        .map_err(into_status_error)?;

    let response = OrderCreatedResponse::from(order);
    let cached = serde_json::to_value(&response).or_500("failed to encode order response")?;

    complete_idempotent(&state, key, ResourceType::Order, 201, &cached).await;

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
        holds::models::HoldUuid,
        orders::{MockOrdersService, OrdersServiceError},
        products::models::ProductUuid,
    };

    use crate::test_helpers::{make_order, orders_service};

    use super::*;

    fn make_service(orders: MockOrdersService) -> Service {
        orders_service(orders, Router::with_path("orders").post(handler))
    }

    #[tokio::test]
    async fn test_create_order_success() -> TestResult {
        let hold = HoldUuid::new();
        let order = make_order(OrderUuid::new(), ProductUuid::new(), hold);
        let order_uuid = order.uuid;

        let mut orders = MockOrdersService::new();

        orders
            .expect_create_order()
            .once()
            .withf(move |new_order| {
                new_order.hold_uuid == hold
                    && new_order.customer_email.as_deref() == Some("buyer@example.com")
            })
            .return_once(move |_| Ok(order));

        let mut res = TestClient::post("http://example.com/orders")
            .json(&json!({
                "hold_id": hold.into_uuid(),
                "customer_email": "buyer@example.com",
            }))
            .send(&make_service(orders))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::CREATED));

        let body: OrderCreatedResponse = res.take_json().await?;
        assert_eq!(body.order_id, order_uuid.into_uuid());
        assert_eq!(body.status, "pending");
        assert_eq!(body.amount, 10_000);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_order_expired_hold_returns_422() -> TestResult {
        let mut orders = MockOrdersService::new();

        orders
            .expect_create_order()
            .once()
            .return_once(|_| Err(OrdersServiceError::HoldExpired));

        let res = TestClient::post("http://example.com/orders")
            .json(&json!({ "hold_id": Uuid::now_v7() }))
            .send(&make_service(orders))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::UNPROCESSABLE_ENTITY));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_order_consumed_hold_returns_422() -> TestResult {
        let mut orders = MockOrdersService::new();

        orders
            .expect_create_order()
            .once()
            .return_once(|_| Err(OrdersServiceError::HoldAlreadyConsumed));

        let res = TestClient::post("http://example.com/orders")
            .json(&json!({ "hold_id": Uuid::now_v7() }))
            .send(&make_service(orders))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::UNPROCESSABLE_ENTITY));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_order_invalid_body_returns_400() -> TestResult {
        let orders = MockOrdersService::new();

        let res = TestClient::post("http://example.com/orders")
            .body("{")
            .send(&make_service(orders))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));

        Ok(())
    }
}
