//! Webhook processor: deduplicates, sequences and applies payment outcomes.
//!
//! Concurrent callbacks for the same order serialize at the order row lock;
//! the monotonic state machine makes the first successful transition win.
//! Callbacks that precede their order are parked in the deferred store and
//! replayed when the order is created.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    cache::StockCache,
    clock::Clock,
    database::{Db, retry_backoff},
    domain::{
        idempotency::{
            models::{ResourceType, Slot, fingerprint},
            repository::{DEFERRED_STATUS, PgIdempotencyRepository},
            service::claim_slot,
        },
        orders::{
            models::{OrderStatus, OrderUuid},
            repository::PgOrdersRepository,
            service::restore_order_stock,
        },
        holds::repository::PgHoldsRepository,
        products::{models::ProductUuid, repository::PgProductsRepository},
        webhooks::{
            errors::WebhooksServiceError,
            models::{
                DeferredWebhookUuid, PaymentOutcome, WebhookDelivery, WebhookOutcome,
                WebhookPayload,
            },
            repository::PgDeferredWebhooksRepository,
            signature,
        },
    },
    settings::{IdempotencySettings, WebhookSettings, WebhookSigning},
};

const WEBHOOK_PATH: &str = "/payments/webhook";

/// How a delivery reached the processor: straight off the wire, or replayed
/// from the deferred store after its order appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryMode {
    Live,
    Replay,
}

fn processed_response(order: OrderUuid, status: OrderStatus) -> Value {
    json!({
        "processed": true,
        "order_id": order.into_uuid(),
        "order_status": status.as_str(),
    })
}

fn deferred_response(order: OrderUuid) -> Value {
    json!({
        "processed": false,
        "order_id": order.into_uuid(),
        "order_status": "deferred",
    })
}

fn conflict_response(order: OrderUuid, status: OrderStatus) -> Value {
    json!({
        "processed": false,
        "order_id": order.into_uuid(),
        "order_status": status.as_str(),
        "error": "order already settled",
    })
}

fn validate(payload: &WebhookPayload) -> Result<(), WebhooksServiceError> {
    if payload.payment_reference.trim().is_empty() {
        return Err(WebhooksServiceError::Invalid(
            "payment_reference must not be empty",
        ));
    }

    if payload.currency.trim().is_empty() {
        return Err(WebhooksServiceError::Invalid("currency must not be empty"));
    }

    Ok(())
}

#[derive(Clone)]
pub struct PgWebhooksService {
    db: Db,
    clock: Arc<dyn Clock>,
    cache: Arc<dyn StockCache>,
    settings: WebhookSettings,
    idempotency_settings: IdempotencySettings,
    idempotency: PgIdempotencyRepository,
    orders: PgOrdersRepository,
    holds: PgHoldsRepository,
    products: PgProductsRepository,
    deferred: PgDeferredWebhooksRepository,
}

impl PgWebhooksService {
    #[must_use]
    pub fn new(
        db: Db,
        clock: Arc<dyn Clock>,
        cache: Arc<dyn StockCache>,
        settings: WebhookSettings,
        idempotency_settings: IdempotencySettings,
    ) -> Self {
        Self {
            db,
            clock,
            cache,
            settings,
            idempotency_settings,
            idempotency: PgIdempotencyRepository::new(),
            orders: PgOrdersRepository::new(),
            holds: PgHoldsRepository::new(),
            products: PgProductsRepository::new(),
            deferred: PgDeferredWebhooksRepository::new(),
        }
    }

    /// Claim the idempotency slot in its own committed transaction, so a
    /// racing duplicate observes the locked-incomplete record instead of
    /// blocking on ours.
    async fn claim(
        &self,
        key: &str,
        fingerprint: &str,
        mode: DeliveryMode,
    ) -> Result<Slot, WebhooksServiceError> {
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;

        let slot = match mode {
            DeliveryMode::Live => {
                claim_slot(
                    &self.idempotency,
                    &mut tx,
                    key,
                    ResourceType::PaymentWebhook,
                    fingerprint,
                    now,
                    &self.idempotency_settings,
                )
                .await?
            }
            DeliveryMode::Replay => {
                // A deferred delivery completed its record with the parked
                // response; re-arm it so the outcome can be applied for real.
                if self
                    .idempotency
                    .reopen_deferred(&mut tx, key, ResourceType::PaymentWebhook, now)
                    .await?
                {
                    Slot::Fresh
                } else {
                    match self
                        .idempotency
                        .get_record(&mut tx, key, ResourceType::PaymentWebhook)
                        .await?
                    {
                        Some(record) if record.is_completed() => Slot::Replayed {
                            status: record.response_status.unwrap_or(200),
                            body: record.response_body.clone().unwrap_or(Value::Null),
                        },
                        Some(_) => Slot::Busy,
                        // The record aged out; claim a brand new slot.
                        None => {
                            claim_slot(
                                &self.idempotency,
                                &mut tx,
                                key,
                                ResourceType::PaymentWebhook,
                                fingerprint,
                                now,
                                &self.idempotency_settings,
                            )
                            .await?
                        }
                    }
                }
            }
        };

        tx.commit().await?;

        Ok(slot)
    }

    /// Apply the payload under the order row lock and complete the
    /// idempotency record in the same transaction.
    async fn try_settle(
        &self,
        key: &str,
        payload: &WebhookPayload,
        raw: &Value,
    ) -> Result<WebhookOutcome, WebhooksServiceError> {
        let now = self.clock.now();
        let order_uuid = OrderUuid::from_uuid(payload.order_id);

        let mut tx = self.db.begin().await?;

        let order = match self.orders.lock_order(&mut tx, order_uuid).await {
            Ok(order) => order,
            Err(sqlx::Error::RowNotFound) => {
                self.deferred
                    .insert(&mut tx, DeferredWebhookUuid::new(), order_uuid, raw, key, now)
                    .await?;

                let response = deferred_response(order_uuid);

                self.idempotency
                    .complete(
                        &mut tx,
                        key,
                        ResourceType::PaymentWebhook,
                        now,
                        DEFERRED_STATUS,
                        &response,
                    )
                    .await?;

                tx.commit().await?;

                return Ok(WebhookOutcome::Deferred {
                    order: order_uuid,
                    response,
                });
            }
            Err(error) => return Err(error.into()),
        };

        let mut restored_product: Option<ProductUuid> = None;

        let order_status = match (payload.status, order.status) {
            (PaymentOutcome::Success, OrderStatus::Pending) => {
                self.orders
                    .mark_paid(&mut tx, order.uuid, now, &payload.payment_reference)
                    .await?;

                OrderStatus::Paid
            }
            (PaymentOutcome::Success, OrderStatus::Paid)
                if order.payment_reference.as_deref()
                    == Some(payload.payment_reference.as_str()) =>
            {
                // The transition this callback asks for already happened.
                OrderStatus::Paid
            }
            (PaymentOutcome::Failed, OrderStatus::Pending) => {
                self.orders
                    .mark_failed(&mut tx, order.uuid, now, &payload.payment_reference)
                    .await?;

                restore_order_stock(&mut tx, &self.holds, &self.products, &order, now).await?;
                restored_product = Some(order.product_uuid);

                OrderStatus::Failed
            }
            (PaymentOutcome::Failed, OrderStatus::Failed) => OrderStatus::Failed,
            (_, current) => {
                let response = conflict_response(order.uuid, current);

                self.idempotency
                    .complete(&mut tx, key, ResourceType::PaymentWebhook, now, 409, &response)
                    .await?;

                tx.commit().await?;

                return Err(WebhooksServiceError::Conflict {
                    order: order.uuid,
                    status: current,
                });
            }
        };

        let response = processed_response(order.uuid, order_status);

        self.idempotency
            .complete(&mut tx, key, ResourceType::PaymentWebhook, now, 200, &response)
            .await?;

        tx.commit().await?;

        if let Some(product) = restored_product {
            self.cache.invalidate(product).await;
        }

        Ok(WebhookOutcome::Processed {
            order: order.uuid,
            order_status,
            response,
        })
    }

    async fn apply(
        &self,
        key: &str,
        fingerprint: &str,
        payload: &WebhookPayload,
        raw: &Value,
        mode: DeliveryMode,
    ) -> Result<WebhookOutcome, WebhooksServiceError> {
        match self.claim(key, fingerprint, mode).await? {
            Slot::Fresh => {}
            Slot::Replayed { status, body } => {
                return Ok(WebhookOutcome::Deduplicated {
                    status,
                    response: body,
                });
            }
            Slot::KeyReuse => return Err(WebhooksServiceError::KeyReuse),
            Slot::Busy => return Err(WebhooksServiceError::Concurrent),
        }

        // We own the slot; deadlocked settlement attempts are re-run without
        // re-claiming it.
        let mut attempt = 0;

        loop {
            match self.try_settle(key, payload, raw).await {
                Err(error) if error.is_transient() && attempt < self.settings.retry.attempts => {
                    attempt += 1;
                    tokio::time::sleep(retry_backoff(attempt - 1, self.settings.retry.backoff))
                        .await;
                }
                Err(error) if error.is_transient() => {
                    self.park_failed(payload, raw, key, &error, attempt + 1).await;

                    return Err(error);
                }
                result => return result,
            }
        }
    }

    /// Dead-letter a callback whose retry budget ran out. Best-effort: a
    /// failure to park is logged and never masks the original error.
    async fn park_failed(
        &self,
        payload: &WebhookPayload,
        raw: &Value,
        key: &str,
        error: &WebhooksServiceError,
        attempts: u32,
    ) {
        let order = OrderUuid::from_uuid(payload.order_id);

        let parked = async {
            let mut tx = self.db.begin().await?;

            self.deferred
                .insert_failed(
                    &mut tx,
                    Some(order),
                    raw,
                    Some(key),
                    &error.to_string(),
                    attempts,
                    self.clock.now(),
                )
                .await?;

            tx.commit().await
        }
        .await;

        if let Err(park_error) = parked {
            warn!(%order, "failed to dead-letter webhook: {park_error}");
        }
    }
}

#[async_trait]
impl WebhooksService for PgWebhooksService {
    async fn process(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, WebhooksServiceError> {
        match &self.settings.signing {
            WebhookSigning::Secret(secret) => {
                let provided = delivery
                    .signature
                    .as_deref()
                    .ok_or(WebhooksServiceError::SignatureMissing)?;

                if !signature::verify(secret, &delivery.body, provided) {
                    return Err(WebhooksServiceError::SignatureInvalid);
                }
            }
            WebhookSigning::Disabled => {}
        }

        let key = delivery
            .idempotency_key
            .as_deref()
            .ok_or(WebhooksServiceError::MissingIdempotencyKey)?;

        let payload: WebhookPayload =
            serde_json::from_slice(&delivery.body).map_err(WebhooksServiceError::Malformed)?;

        validate(&payload)?;

        let raw: Value =
            serde_json::from_slice(&delivery.body).map_err(WebhooksServiceError::Malformed)?;

        let fingerprint = fingerprint("POST", WEBHOOK_PATH, &delivery.body);

        self.apply(key, &fingerprint, &payload, &raw, DeliveryMode::Live)
            .await
    }

    async fn replay_deferred(&self, order: OrderUuid) -> Result<usize, WebhooksServiceError> {
        let mut tx = self.db.begin().await?;
        let entries = self.deferred.for_order(&mut tx, order).await?;
        tx.commit().await?;

        let mut applied = 0;

        for entry in entries {
            let payload: WebhookPayload = match serde_json::from_value(entry.payload.clone()) {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(%order, deferred = %entry.uuid, "skipping undecodable deferred webhook: {error}");
                    continue;
                }
            };

            let body = match serde_json::to_vec(&entry.payload) {
                Ok(body) => body,
                Err(error) => {
                    warn!(%order, deferred = %entry.uuid, "skipping unserializable deferred webhook: {error}");
                    continue;
                }
            };

            let fingerprint = fingerprint("POST", WEBHOOK_PATH, &body);

            match self
                .apply(
                    &entry.idempotency_key,
                    &fingerprint,
                    &payload,
                    &entry.payload,
                    DeliveryMode::Replay,
                )
                .await
            {
                Ok(_) => {
                    self.discard_deferred(entry.uuid).await;
                    applied += 1;
                }
                // The order settled some other way first; this callback has
                // nothing left to say.
                Err(WebhooksServiceError::Conflict { .. }) => {
                    self.discard_deferred(entry.uuid).await;
                }
                Err(error) => {
                    warn!(%order, deferred = %entry.uuid, "deferred webhook replay failed: {error}");
                }
            }
        }

        Ok(applied)
    }
}

impl PgWebhooksService {
    async fn discard_deferred(&self, entry: DeferredWebhookUuid) {
        let deleted = async {
            let mut tx = self.db.begin().await?;
            self.deferred.delete(&mut tx, entry).await?;
            tx.commit().await
        }
        .await;

        if let Err(error) = deleted {
            warn!(deferred = %entry, "failed to drop consumed deferred webhook: {error}");
        }
    }
}

#[automock]
#[async_trait]
pub trait WebhooksService: Send + Sync {
    /// Verify, deduplicate and apply one payment callback. Exactly-once: for
    /// any idempotency key the system state after any number of invocations
    /// equals the state after one.
    async fn process(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, WebhooksServiceError>;

    /// Apply callbacks that arrived before `order` existed, in arrival
    /// order. Safe to call at any time; settled callbacks deduplicate.
    async fn replay_deferred(&self, order: OrderUuid) -> Result<usize, WebhooksServiceError>;
}
