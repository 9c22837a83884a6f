//! Payment Webhook Handler

use std::sync::Arc;

use salvo::prelude::*;

use floodgate_app::domain::webhooks::models::{WebhookDelivery, WebhookOutcome};

use crate::{extensions::*, payments::errors::into_status_error, state::State};

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Payment Webhook Handler
///
/// Accepts signed settlement callbacks from the payment gateway. Duplicate
/// deliveries replay the original response; callbacks for orders that do not
/// exist yet are stored and applied when the order is created.
#[endpoint(
    tags("payments"),
    summary = "Payment Webhook",
    responses(
        (status_code = StatusCode::OK, description = "Callback applied (or replayed)"),
        (status_code = StatusCode::ACCEPTED, description = "Order unknown; callback deferred"),
        (status_code = StatusCode::UNAUTHORIZED, description = "Bad signature"),
        (status_code = StatusCode::CONFLICT, description = "Idempotency or settlement conflict"),
        (status_code = StatusCode::UNPROCESSABLE_ENTITY, description = "Invalid payload"),
    ),
)]
pub(crate) async fn handler(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), StatusError> {
    let state = depot.obtain_or_500::<Arc<State>>()?;

    let body = req
        .payload()
        .await
        .map_err(|_| StatusError::bad_request().brief("Unreadable request body"))?
        .to_vec();

    let delivery = WebhookDelivery {
        body,
        signature: req.header::<String>(&state.webhook_signature_header),
        idempotency_key: req.header::<String>(IDEMPOTENCY_KEY_HEADER),
    };

    let outcome = state
        .app
        .webhooks
        .process(delivery)
        .await
        .map_err(into_status_error)?;

    match outcome {
        WebhookOutcome::Processed { response, .. } => {
            res.render(Json(response));
        }
        WebhookOutcome::Deferred { response, .. } => {
            res.status_code(StatusCode::ACCEPTED);
            res.render(Json(response));
        }
        WebhookOutcome::Deduplicated { status, response } => {
            render_replay(res, status, response);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::json;
    use testresult::TestResult;

    use floodgate_app::domain::{
        orders::models::{OrderStatus, OrderUuid},
        webhooks::{MockWebhooksService, WebhooksServiceError},
    };

    use crate::test_helpers::webhooks_service;

    use super::*;

    fn make_service(webhooks: MockWebhooksService) -> Service {
        webhooks_service(
            webhooks,
            Router::with_path("payments/webhook").post(handler),
        )
    }

    fn callback_body(order: OrderUuid) -> serde_json::Value {
        json!({
            "order_id": order.into_uuid(),
            "status": "success",
            "payment_reference": "pay_1",
            "amount": 1000,
            "currency": "EUR",
            "timestamp": "2025-06-01T00:00:00Z",
        })
    }

    #[tokio::test]
    async fn test_processed_callback_returns_200() -> TestResult {
        let order = OrderUuid::new();

        let mut webhooks = MockWebhooksService::new();

        webhooks
            .expect_process()
            .once()
            .withf(|delivery| {
                delivery.idempotency_key.as_deref() == Some("wk-1")
                    && delivery.signature.as_deref() == Some("sig")
            })
            .return_once(move |_| {
                Ok(WebhookOutcome::Processed {
                    order,
                    order_status: OrderStatus::Paid,
                    response: json!({
                        "processed": true,
                        "order_id": order.into_uuid(),
                        "order_status": "paid",
                    }),
                })
            });

        let mut res = TestClient::post("http://example.com/payments/webhook")
            .add_header("idempotency-key", "wk-1", true)
            .add_header("x-webhook-signature", "sig", true)
            .json(&callback_body(order))
            .send(&make_service(webhooks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));

        let body: serde_json::Value = res.take_json().await?;
        assert_eq!(body["processed"], json!(true));
        assert_eq!(body["order_status"], json!("paid"));

        Ok(())
    }

    #[tokio::test]
    async fn test_deferred_callback_returns_202() -> TestResult {
        let order = OrderUuid::new();

        let mut webhooks = MockWebhooksService::new();

        webhooks.expect_process().once().return_once(move |_| {
            Ok(WebhookOutcome::Deferred {
                order,
                response: json!({
                    "processed": false,
                    "order_id": order.into_uuid(),
                    "order_status": "deferred",
                }),
            })
        });

        let res = TestClient::post("http://example.com/payments/webhook")
            .add_header("idempotency-key", "wk-2", true)
            .json(&callback_body(order))
            .send(&make_service(webhooks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::ACCEPTED));

        Ok(())
    }

    #[tokio::test]
    async fn test_deduplicated_callback_replays_recorded_status() -> TestResult {
        let order = OrderUuid::new();

        let mut webhooks = MockWebhooksService::new();

        webhooks.expect_process().once().return_once(|_| {
            Ok(WebhookOutcome::Deduplicated {
                status: 202,
                response: json!({ "processed": false }),
            })
        });

        let res = TestClient::post("http://example.com/payments/webhook")
            .add_header("idempotency-key", "wk-3", true)
            .json(&callback_body(order))
            .send(&make_service(webhooks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::ACCEPTED));

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_signature_returns_401() -> TestResult {
        let mut webhooks = MockWebhooksService::new();

        webhooks
            .expect_process()
            .once()
            .return_once(|_| Err(WebhooksServiceError::SignatureInvalid));

        let res = TestClient::post("http://example.com/payments/webhook")
            .add_header("idempotency-key", "wk-4", true)
            .add_header("x-webhook-signature", "bad", true)
            .json(&callback_body(OrderUuid::new()))
            .send(&make_service(webhooks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));

        Ok(())
    }

    #[tokio::test]
    async fn test_key_reuse_returns_409() -> TestResult {
        let mut webhooks = MockWebhooksService::new();

        webhooks
            .expect_process()
            .once()
            .return_once(|_| Err(WebhooksServiceError::KeyReuse));

        let res = TestClient::post("http://example.com/payments/webhook")
            .add_header("idempotency-key", "wk-5", true)
            .json(&callback_body(OrderUuid::new()))
            .send(&make_service(webhooks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::CONFLICT));

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_idempotency_key_returns_422() -> TestResult {
        let mut webhooks = MockWebhooksService::new();

        webhooks
            .expect_process()
            .once()
            .withf(|delivery| delivery.idempotency_key.is_none())
            .return_once(|_| Err(WebhooksServiceError::MissingIdempotencyKey));

        let res = TestClient::post("http://example.com/payments/webhook")
            .json(&callback_body(OrderUuid::new()))
            .send(&make_service(webhooks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::UNPROCESSABLE_ENTITY));

        Ok(())
    }
}
