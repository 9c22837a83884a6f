//! Tunable knobs for the checkout core, threaded into services at
//! construction.

use std::time::Duration;

use jiff::SignedDuration;

use crate::domain::idempotency::models::ResourceType;

/// Deadlock retry budget shared by every transactional service.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    /// How many times a deadlocked transaction is re-run before the error is
    /// surfaced to the caller.
    pub attempts: u32,
    /// Base backoff between attempts; grows exponentially with jitter.
    pub backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HoldSettings {
    /// Lifetime of a pending hold.
    pub ttl: SignedDuration,
    /// Upper bound on a single reservation.
    pub max_quantity: u64,
    pub retry: RetrySettings,
}

impl Default for HoldSettings {
    fn default() -> Self {
        Self {
            ttl: SignedDuration::from_secs(120),
            max_quantity: 10,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Pause between sweep runs.
    pub interval: Duration,
    /// Maximum holds (and stale orders) handled per run.
    pub batch_size: i64,
    /// Lease lifetime; a crashed sweeper frees the lease after this long.
    pub lease_ttl: SignedDuration,
    /// Pending orders older than this are cancelled.
    pub payment_window: SignedDuration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 100,
            lease_ttl: SignedDuration::from_mins(5),
            payment_window: SignedDuration::from_mins(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Lifetime of a cached available-stock value.
    pub stock_ttl: SignedDuration,
    /// How long a cache miss waits on another in-flight load of the same key
    /// before falling through to its own store read.
    pub flight_wait: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stock_ttl: SignedDuration::from_secs(30),
            flight_wait: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdempotencySettings {
    pub webhook_ttl: SignedDuration,
    pub order_ttl: SignedDuration,
    pub hold_ttl: SignedDuration,
    /// An incomplete record whose lock is older than this may be taken over.
    pub lock_takeover_after: SignedDuration,
}

impl IdempotencySettings {
    #[must_use]
    pub fn ttl_for(&self, resource: ResourceType) -> SignedDuration {
        match resource {
            ResourceType::PaymentWebhook => self.webhook_ttl,
            ResourceType::Order => self.order_ttl,
            ResourceType::Hold => self.hold_ttl,
        }
    }
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            webhook_ttl: SignedDuration::from_hours(24),
            order_ttl: SignedDuration::from_hours(1),
            hold_ttl: SignedDuration::from_mins(5),
            lock_takeover_after: SignedDuration::from_secs(10),
        }
    }
}

/// Webhook signature enforcement.
#[derive(Debug, Clone)]
pub enum WebhookSigning {
    /// Verify HMAC-SHA256 over the raw body with this preshared secret.
    Secret(String),
    /// Accept unsigned callbacks. Test mode only.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub signing: WebhookSigning,
    pub retry: RetrySettings,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            signing: WebhookSigning::Disabled,
            retry: RetrySettings::default(),
        }
    }
}

/// Everything [`crate::context::AppContext`] needs to assemble the services.
#[derive(Debug, Clone, Default)]
pub struct AppSettings {
    pub holds: HoldSettings,
    pub webhooks: WebhookSettings,
    pub idempotency: IdempotencySettings,
    pub retry: RetrySettings,
}
