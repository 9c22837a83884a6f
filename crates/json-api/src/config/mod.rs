//! Server configuration module

use clap::Parser;

use floodgate_app::settings::{
    AppSettings, CacheSettings, HoldSettings, IdempotencySettings, RetrySettings, SweepSettings,
    WebhookSettings, WebhookSigning,
};

use crate::config::{
    checkout::CheckoutConfig, db::DatabaseConfig, observability::LoggingConfig,
    server::ServerRuntimeConfig, webhook::WebhookConfig,
};

pub(crate) mod checkout;
pub(crate) mod db;
pub(crate) mod observability;
pub(crate) mod server;
pub(crate) mod webhook;

/// Floodgate JSON API Server configuration
#[derive(Debug, Parser)]
#[command(name = "floodgate-json", about = "Floodgate JSON API Server", long_about = None)]
pub struct ServerConfig {
    /// Server network settings.
    #[command(flatten)]
    pub server: ServerRuntimeConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Application database settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Checkout core settings.
    #[command(flatten)]
    pub checkout: CheckoutConfig,

    /// Payment webhook settings.
    #[command(flatten)]
    pub webhook: WebhookConfig,
}

impl ServerConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    /// Get the socket address for binding
    #[must_use]
    pub fn socket_addr(&self) -> String {
        self.server.socket_addr()
    }

    fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            attempts: self.checkout.deadlock_retries,
            backoff: std::time::Duration::from_millis(self.checkout.deadlock_backoff_ms),
        }
    }

    fn idempotency_settings(&self) -> IdempotencySettings {
        IdempotencySettings {
            webhook_ttl: jiff::SignedDuration::from_secs(
                self.checkout.idempotency_webhook_ttl_seconds,
            ),
            order_ttl: jiff::SignedDuration::from_secs(self.checkout.idempotency_order_ttl_seconds),
            hold_ttl: jiff::SignedDuration::from_secs(self.checkout.idempotency_hold_ttl_seconds),
            ..IdempotencySettings::default()
        }
    }

    #[must_use]
    pub fn app_settings(&self) -> AppSettings {
        let signing = match &self.webhook.hmac_secret {
            Some(secret) => WebhookSigning::Secret(secret.clone()),
            None => WebhookSigning::Disabled,
        };

        AppSettings {
            holds: HoldSettings {
                ttl: jiff::SignedDuration::from_secs(self.checkout.hold_ttl_seconds),
                max_quantity: self.checkout.max_hold_quantity,
                retry: self.retry_settings(),
            },
            webhooks: WebhookSettings {
                signing,
                retry: self.retry_settings(),
            },
            idempotency: self.idempotency_settings(),
            retry: self.retry_settings(),
        }
    }

    #[must_use]
    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            interval: std::time::Duration::from_secs(self.checkout.hold_sweep_interval_seconds),
            batch_size: self.checkout.hold_sweep_batch_size,
            payment_window: jiff::SignedDuration::from_mins(self.checkout.payment_window_minutes),
            ..SweepSettings::default()
        }
    }

    #[must_use]
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            stock_ttl: jiff::SignedDuration::from_secs(self.checkout.stock_cache_ttl_seconds),
            ..CacheSettings::default()
        }
    }
}
