//! Checkout Core Config

use clap::Args;

/// Tunables for the reservation engine, sweep and idempotency layer.
#[derive(Debug, Args)]
pub struct CheckoutConfig {
    /// Lifetime of a pending hold in seconds.
    #[arg(long, env = "HOLD_TTL_SECONDS", default_value_t = 120)]
    pub hold_ttl_seconds: i64,

    /// Maximum quantity a single hold may reserve.
    #[arg(long, env = "MAX_HOLD_QUANTITY", default_value_t = 10)]
    pub max_hold_quantity: u64,

    /// Maximum holds (and stale orders) handled per sweep run.
    #[arg(long, env = "HOLD_SWEEP_BATCH_SIZE", default_value_t = 100)]
    pub hold_sweep_batch_size: i64,

    /// Pause between sweep runs in seconds.
    #[arg(long, env = "HOLD_SWEEP_INTERVAL_SECONDS", default_value_t = 60)]
    pub hold_sweep_interval_seconds: u64,

    /// Lifetime of a cached available-stock value in seconds.
    #[arg(long, env = "STOCK_CACHE_TTL_SECONDS", default_value_t = 30)]
    pub stock_cache_ttl_seconds: i64,

    /// How many times a deadlocked transaction is retried.
    #[arg(long, env = "DEADLOCK_RETRIES", default_value_t = 3)]
    pub deadlock_retries: u32,

    /// Base backoff between deadlock retries in milliseconds.
    #[arg(long, env = "DEADLOCK_BACKOFF_MS", default_value_t = 100)]
    pub deadlock_backoff_ms: u64,

    /// Pending orders older than this many minutes are cancelled by the sweep.
    #[arg(long, env = "PAYMENT_WINDOW_MINUTES", default_value_t = 30)]
    pub payment_window_minutes: i64,

    /// Idempotency record lifetime for webhook deliveries, in seconds.
    #[arg(long, env = "IDEMPOTENCY_WEBHOOK_TTL_SECONDS", default_value_t = 86_400)]
    pub idempotency_webhook_ttl_seconds: i64,

    /// Idempotency record lifetime for order creation, in seconds.
    #[arg(long, env = "IDEMPOTENCY_ORDER_TTL_SECONDS", default_value_t = 3_600)]
    pub idempotency_order_ttl_seconds: i64,

    /// Idempotency record lifetime for hold creation, in seconds.
    #[arg(long, env = "IDEMPOTENCY_HOLD_TTL_SECONDS", default_value_t = 300)]
    pub idempotency_hold_ttl_seconds: i64,

    /// Concurrent `POST /holds` requests admitted before shedding load.
    #[arg(long, env = "MAX_INFLIGHT_HOLDS", default_value_t = 256)]
    pub max_inflight_holds: usize,
}
