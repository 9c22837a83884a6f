//! Idempotency Models

use jiff::Timestamp;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Which kind of resource an idempotency key protects. Keys are scoped per
/// resource type, so the same key may be reused across types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    PaymentWebhook,
    Order,
    Hold,
}

impl ResourceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentWebhook => "payment_webhook",
            Self::Order => "order",
            Self::Hold => "hold",
        }
    }
}

/// One slot in the idempotency table. Created locked-incomplete, completed
/// with the cached response, purged after `expires_at`.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,
    pub resource_type: String,
    pub fingerprint: String,
    pub response_status: Option<u16>,
    pub response_body: Option<Value>,
    pub locked_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub expires_at: Timestamp,
}

impl IdempotencyRecord {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Outcome of claiming an idempotency slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// The caller owns the slot and must run the operation.
    Fresh,
    /// A completed record with a matching fingerprint exists; respond with
    /// the cached status and body.
    Replayed { status: u16, body: Value },
    /// A completed record exists for this key with a different request body.
    KeyReuse,
    /// Another request holds the slot's lock; the caller should retry.
    Busy,
}

/// Request fingerprint: duplicate detection compares this rather than the
/// stored body.
#[must_use]
pub fn fingerprint(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();

    hasher.update(method.as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(body);

    hex::encode(hasher.finalize())
}
