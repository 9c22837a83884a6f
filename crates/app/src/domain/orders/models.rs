//! Order Models

use jiff::Timestamp;
use serde_json::Value;

use crate::{
    domain::{holds::models::HoldUuid, products::models::ProductUuid},
    uuids::TypedUuid,
};

/// Order UUID
pub type OrderUuid = TypedUuid<Order>;

/// Order state. Transitions are monotonic: `Pending` may move to any of the
/// three terminal states, terminal states never move again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Order Model
///
/// `quantity` and `unit_price` are value snapshots taken when the hold was
/// consumed, not live links to the product row.
#[derive(Debug, Clone)]
pub struct Order {
    pub uuid: OrderUuid,
    pub product_uuid: ProductUuid,
    pub hold_uuid: HoldUuid,
    pub quantity: u64,
    pub unit_price: u64,
    pub total_amount: u64,
    pub status: OrderStatus,
    pub customer_email: Option<String>,
    pub customer_details: Option<Value>,
    pub payment_reference: Option<String>,
    pub paid_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// New Order Model
///
/// The order id is minted by the caller (the HTTP adapter, or a payment
/// session created ahead of checkout), so settlement callbacks referencing
/// it may legitimately arrive before the row exists.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub uuid: OrderUuid,
    pub hold_uuid: HoldUuid,
    pub customer_email: Option<String>,
    pub customer_details: Option<Value>,
}
