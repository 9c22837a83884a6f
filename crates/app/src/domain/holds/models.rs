//! Hold Models

use jiff::Timestamp;

use crate::{domain::products::models::ProductUuid, uuids::TypedUuid};

/// Hold UUID
pub type HoldUuid = TypedUuid<Hold>;

/// Hold lifecycle state. `Pending` is the only non-terminal state: once a
/// hold has been consumed or expired it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldStatus {
    Pending,
    Consumed,
    Expired,
}

impl HoldStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "consumed" => Some(Self::Consumed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Hold Model
///
/// A transient reservation of product stock with a fixed lifetime.
#[derive(Debug, Clone)]
pub struct Hold {
    pub uuid: HoldUuid,
    pub product_uuid: ProductUuid,
    pub quantity: u64,
    pub session_id: Option<String>,
    pub status: HoldStatus,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub consumed_at: Option<Timestamp>,
}

impl Hold {
    /// Pending and not yet past its deadline: still counts against stock
    /// and can be converted into an order.
    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.status == HoldStatus::Pending && self.expires_at > now
    }

    /// Pending but past its deadline; the sweep will reclaim it.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.status == HoldStatus::Pending && self.expires_at <= now
    }
}

/// New Hold Model
#[derive(Debug, Clone, PartialEq)]
pub struct NewHold {
    pub product_uuid: ProductUuid,
    pub quantity: u64,
    pub session_id: Option<String>,
}

/// Result of releasing a hold. Releasing an already-expired hold is a no-op
/// rather than an error so the operation stays idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyExpired,
}
