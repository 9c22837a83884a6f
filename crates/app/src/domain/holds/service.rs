//! Holds service: the stock reservation engine.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;

use crate::{
    cache::StockCache,
    clock::Clock,
    database::{Db, retry_backoff},
    domain::{
        holds::{
            errors::HoldsServiceError,
            models::{Hold, HoldStatus, HoldUuid, NewHold, ReleaseOutcome},
            repository::PgHoldsRepository,
        },
        products::{models::ProductUuid, repository::PgProductsRepository},
    },
    settings::HoldSettings,
};

#[derive(Clone)]
pub struct PgHoldsService {
    db: Db,
    clock: Arc<dyn Clock>,
    cache: Arc<dyn StockCache>,
    settings: HoldSettings,
    holds: PgHoldsRepository,
    products: PgProductsRepository,
}

impl PgHoldsService {
    #[must_use]
    pub fn new(
        db: Db,
        clock: Arc<dyn Clock>,
        cache: Arc<dyn StockCache>,
        settings: HoldSettings,
    ) -> Self {
        Self {
            db,
            clock,
            cache,
            settings,
            holds: PgHoldsRepository::new(),
            products: PgProductsRepository::new(),
        }
    }

    /// One reservation attempt in a single transaction. Returns the created
    /// hold and the post-decrement counter for the cache write-through.
    async fn try_reserve(&self, new_hold: &NewHold) -> Result<(Hold, u64), HoldsServiceError> {
        let now = self.clock.now();

        let mut tx = self.db.begin().await.map_err(HoldsServiceError::Sql)?;

        let product = self
            .products
            .lock_product(&mut tx, new_hold.product_uuid)
            .await
            .map_err(|error| match error {
                sqlx::Error::RowNotFound => HoldsServiceError::ProductMissing,
                error => error.into(),
            })?;

        if !product.active {
            return Err(HoldsServiceError::ProductInactive);
        }

        if product.available_stock < new_hold.quantity {
            return Err(HoldsServiceError::InsufficientStock {
                available: product.available_stock,
                requested: new_hold.quantity,
            });
        }

        let quantity = i64::try_from(new_hold.quantity)?;

        let available = self
            .products
            .adjust_available_stock(&mut tx, new_hold.product_uuid, -quantity, now)
            .await?;

        let hold = self
            .holds
            .create_hold(
                &mut tx,
                HoldUuid::new(),
                new_hold,
                now + self.settings.ttl,
                now,
            )
            .await?;

        tx.commit().await.map_err(HoldsServiceError::Sql)?;

        Ok((hold, available))
    }

    async fn try_release(
        &self,
        hold: HoldUuid,
    ) -> Result<(ReleaseOutcome, Option<ProductUuid>), HoldsServiceError> {
        let now = self.clock.now();

        let mut tx = self.db.begin().await.map_err(HoldsServiceError::Sql)?;

        let hold = self.holds.lock_hold(&mut tx, hold).await?;

        match hold.status {
            HoldStatus::Consumed => Err(HoldsServiceError::AlreadyConsumed),
            HoldStatus::Expired => Ok((ReleaseOutcome::AlreadyExpired, None)),
            HoldStatus::Pending => {
                self.holds.mark_expired(&mut tx, hold.uuid).await?;

                let quantity = i64::try_from(hold.quantity)?;

                self.products
                    .adjust_available_stock(&mut tx, hold.product_uuid, quantity, now)
                    .await?;

                tx.commit().await.map_err(HoldsServiceError::Sql)?;

                Ok((ReleaseOutcome::Released, Some(hold.product_uuid)))
            }
        }
    }
}

#[async_trait]
impl HoldsService for PgHoldsService {
    async fn reserve(&self, new_hold: NewHold) -> Result<Hold, HoldsServiceError> {
        if new_hold.quantity < 1 || new_hold.quantity > self.settings.max_quantity {
            return Err(HoldsServiceError::InvalidQuantity {
                max: self.settings.max_quantity,
            });
        }

        let mut attempt = 0;

        loop {
            match self.try_reserve(&new_hold).await {
                Err(error) if error.is_transient() && attempt < self.settings.retry.attempts => {
                    attempt += 1;
                    tokio::time::sleep(retry_backoff(attempt - 1, self.settings.retry.backoff))
                        .await;
                }
                Err(error) => return Err(error),
                Ok((hold, available)) => {
                    // The counter changed; drop the cached value, then seed
                    // the fresh one (best-effort, the cache stays
                    // non-authoritative either way).
                    self.cache.invalidate(hold.product_uuid).await;
                    self.cache.put(hold.product_uuid, available).await;

                    return Ok(hold);
                }
            }
        }
    }

    async fn release(&self, hold: HoldUuid) -> Result<ReleaseOutcome, HoldsServiceError> {
        let mut attempt = 0;

        loop {
            match self.try_release(hold).await {
                Err(error) if error.is_transient() && attempt < self.settings.retry.attempts => {
                    attempt += 1;
                    tokio::time::sleep(retry_backoff(attempt - 1, self.settings.retry.backoff))
                        .await;
                }
                Err(error) => return Err(error),
                Ok((outcome, product)) => {
                    if let Some(product) = product {
                        self.cache.invalidate(product).await;
                    }

                    return Ok(outcome);
                }
            }
        }
    }

    async fn get_hold(&self, hold: HoldUuid) -> Result<Hold, HoldsServiceError> {
        let mut tx = self.db.begin().await.map_err(HoldsServiceError::Sql)?;

        let hold = self.holds.get_hold(&mut tx, hold).await?;

        tx.commit().await.map_err(HoldsServiceError::Sql)?;

        Ok(hold)
    }

    async fn expired_holds(&self, limit: i64) -> Result<Vec<Hold>, HoldsServiceError> {
        let mut tx = self.db.begin().await.map_err(HoldsServiceError::Sql)?;

        let holds = self
            .holds
            .expired_pending(&mut tx, self.clock.now(), limit)
            .await?;

        tx.commit().await.map_err(HoldsServiceError::Sql)?;

        Ok(holds)
    }
}

#[automock]
#[async_trait]
pub trait HoldsService: Send + Sync {
    /// Reserve stock: atomically decrement the product's available counter
    /// and create a pending hold with a fixed deadline. On any failure no
    /// state change is observable.
    async fn reserve(&self, new_hold: NewHold) -> Result<Hold, HoldsServiceError>;

    /// Expire a pending hold and return its quantity to the available
    /// counter. Idempotent: releasing an already-expired hold is a no-op.
    async fn release(&self, hold: HoldUuid) -> Result<ReleaseOutcome, HoldsServiceError>;

    /// Retrieve a single hold.
    async fn get_hold(&self, hold: HoldUuid) -> Result<Hold, HoldsServiceError>;

    /// Pending holds past their deadline, oldest first, for the sweep.
    async fn expired_holds(&self, limit: i64) -> Result<Vec<Hold>, HoldsServiceError>;
}
