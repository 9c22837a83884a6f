//! App Context
//!
//! Collaborators are constructed once at startup and threaded through
//! explicitly; nothing reaches for a global.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    cache::StockCache,
    clock::Clock,
    database::{self, Db},
    domain::{
        holds::{HoldsService, PgHoldsService},
        idempotency::{IdempotencyService, PgIdempotencyService},
        orders::{OrdersService, PgOrdersService},
        products::{PgProductsService, ProductsService},
        webhooks::{PgWebhooksService, WebhooksService},
    },
    settings::AppSettings,
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),
}

#[derive(Clone)]
pub struct AppContext {
    pub products: Arc<dyn ProductsService>,
    pub holds: Arc<dyn HoldsService>,
    pub orders: Arc<dyn OrdersService>,
    pub webhooks: Arc<dyn WebhooksService>,
    pub idempotency: Arc<dyn IdempotencyService>,
}

impl AppContext {
    /// Wire the Pg services over a shared pool, clock and cache.
    #[must_use]
    pub fn new(
        db: Db,
        clock: Arc<dyn Clock>,
        cache: Arc<dyn StockCache>,
        settings: AppSettings,
    ) -> Self {
        let webhooks = Arc::new(PgWebhooksService::new(
            db.clone(),
            clock.clone(),
            cache.clone(),
            settings.webhooks,
            settings.idempotency.clone(),
        ));

        let orders = Arc::new(PgOrdersService::new(
            db.clone(),
            clock.clone(),
            cache.clone(),
            webhooks.clone(),
            settings.retry,
        ));

        let holds = Arc::new(PgHoldsService::new(
            db.clone(),
            clock.clone(),
            cache.clone(),
            settings.holds,
        ));

        let idempotency = Arc::new(PgIdempotencyService::new(
            db.clone(),
            clock.clone(),
            settings.idempotency,
        ));

        let products = Arc::new(PgProductsService::new(db, clock, cache));

        Self {
            products,
            holds,
            orders,
            webhooks,
            idempotency,
        }
    }

    /// Build application context from a database URL.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection fails.
    pub async fn from_database_url(
        url: &str,
        clock: Arc<dyn Clock>,
        cache: Arc<dyn StockCache>,
        settings: AppSettings,
    ) -> Result<Self, AppInitError> {
        let pool = database::connect(url)
            .await
            .map_err(AppInitError::Database)?;

        Ok(Self::new(Db::new(pool), clock, cache, settings))
    }
}
