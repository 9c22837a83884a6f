//! Webhook Models

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::orders::models::{OrderStatus, OrderUuid},
    uuids::TypedUuid,
};

/// Settlement outcome reported by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Success,
    Failed,
}

/// The callback body the processor recognizes. Deserialization enforces the
/// required fields; `validate` covers what serde cannot express.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub order_id: Uuid,
    pub status: PaymentOutcome,
    pub payment_reference: String,
    pub amount: u64,
    pub currency: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A callback exactly as it came off the wire, before verification.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub body: Vec<u8>,
    pub signature: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Deferred Webhook UUID
pub type DeferredWebhookUuid = TypedUuid<DeferredWebhook>;

/// A callback stored for later because its order did not exist yet.
#[derive(Debug, Clone)]
pub struct DeferredWebhook {
    pub uuid: DeferredWebhookUuid,
    pub order_uuid: OrderUuid,
    pub payload: Value,
    pub idempotency_key: String,
    pub received_at: Timestamp,
}

/// What processing a delivery produced. Every variant carries the JSON body
/// the HTTP layer should render; for deduplicated deliveries it is the cached
/// response of the first processing, status code included.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Processed {
        order: OrderUuid,
        order_status: OrderStatus,
        response: Value,
    },
    Deferred {
        order: OrderUuid,
        response: Value,
    },
    Deduplicated {
        status: u16,
        response: Value,
    },
}
