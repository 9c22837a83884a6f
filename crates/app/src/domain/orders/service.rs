//! Orders service: converts holds into orders and drives monotonic state
//! transitions.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use sqlx::{Postgres, Transaction};
use tracing::warn;

use crate::{
    cache::StockCache,
    clock::Clock,
    database::{Db, retry_backoff},
    domain::{
        holds::{models::HoldStatus, repository::PgHoldsRepository},
        orders::{
            errors::OrdersServiceError,
            models::{NewOrder, Order, OrderStatus, OrderUuid},
            repository::{OrderRow, PgOrdersRepository},
        },
        products::{models::ProductUuid, repository::PgProductsRepository},
        webhooks::WebhooksService,
    },
    settings::RetrySettings,
};

/// Return an order's quantity to the available-stock counter when the order
/// leaves the "sold" set (failed or cancelled).
///
/// The consumed hold normally accounts for the units; if the hold is somehow
/// still pending the release path runs instead, so the stock is credited
/// exactly once either way. An already-expired hold has returned its units
/// through the sweep and is left alone.
pub(crate) async fn restore_order_stock(
    tx: &mut Transaction<'_, Postgres>,
    holds: &PgHoldsRepository,
    products: &PgProductsRepository,
    order: &Order,
    now: Timestamp,
) -> Result<(), sqlx::Error> {
    let hold = holds.lock_hold(tx, order.hold_uuid).await?;

    let quantity = i64::try_from(order.quantity).map_err(|e| sqlx::Error::ColumnDecode {
        index: "quantity".to_string(),
        source: Box::new(e),
    })?;

    match hold.status {
        HoldStatus::Consumed => {
            products
                .adjust_available_stock(tx, order.product_uuid, quantity, now)
                .await?;
        }
        HoldStatus::Pending => {
            warn!(
                hold = %hold.uuid,
                order = %order.uuid,
                "order hold still pending at settlement; releasing it"
            );

            holds.mark_expired(tx, hold.uuid).await?;

            products
                .adjust_available_stock(tx, order.product_uuid, quantity, now)
                .await?;
        }
        HoldStatus::Expired => {}
    }

    Ok(())
}

#[derive(Clone)]
pub struct PgOrdersService {
    db: Db,
    clock: Arc<dyn Clock>,
    cache: Arc<dyn StockCache>,
    webhooks: Arc<dyn WebhooksService>,
    retry: RetrySettings,
    orders: PgOrdersRepository,
    holds: PgHoldsRepository,
    products: PgProductsRepository,
}

impl PgOrdersService {
    #[must_use]
    pub fn new(
        db: Db,
        clock: Arc<dyn Clock>,
        cache: Arc<dyn StockCache>,
        webhooks: Arc<dyn WebhooksService>,
        retry: RetrySettings,
    ) -> Self {
        Self {
            db,
            clock,
            cache,
            webhooks,
            retry,
            orders: PgOrdersRepository::new(),
            holds: PgHoldsRepository::new(),
            products: PgProductsRepository::new(),
        }
    }

    async fn try_create(&self, new_order: &NewOrder) -> Result<Order, OrdersServiceError> {
        let now = self.clock.now();

        let mut tx = self.db.begin().await.map_err(OrdersServiceError::Sql)?;

        let hold = self
            .holds
            .lock_hold(&mut tx, new_order.hold_uuid)
            .await
            .map_err(|error| match error {
                sqlx::Error::RowNotFound => OrdersServiceError::HoldMissing,
                error => error.into(),
            })?;

        if hold.status != HoldStatus::Pending {
            return Err(OrdersServiceError::HoldAlreadyConsumed);
        }

        if hold.expires_at <= now {
            return Err(OrdersServiceError::HoldExpired);
        }

        self.holds.mark_consumed(&mut tx, hold.uuid, now).await?;

        // Price snapshot: the order keeps these values even if the product
        // changes later.
        let product = self.products.get_product(&mut tx, hold.product_uuid).await?;

        let order = self
            .orders
            .create_order(
                &mut tx,
                OrderRow {
                    uuid: new_order.uuid,
                    product_uuid: product.uuid.into_uuid(),
                    hold_uuid: hold.uuid,
                    quantity: hold.quantity,
                    unit_price: product.price,
                    customer_email: new_order.customer_email.as_deref(),
                    customer_details: new_order.customer_details.as_ref(),
                },
                now,
            )
            .await?;

        tx.commit().await.map_err(OrdersServiceError::Sql)?;

        Ok(order)
    }

    async fn try_cancel(
        &self,
        order: OrderUuid,
    ) -> Result<(Order, Option<ProductUuid>), OrdersServiceError> {
        let now = self.clock.now();

        let mut tx = self.db.begin().await.map_err(OrdersServiceError::Sql)?;

        let order = self.orders.lock_order(&mut tx, order).await?;

        if order.status.is_terminal() {
            // Monotonic no-op: report the state already reached.
            return Ok((order, None));
        }

        self.orders.mark_cancelled(&mut tx, order.uuid, now).await?;

        restore_order_stock(&mut tx, &self.holds, &self.products, &order, now).await?;

        tx.commit().await.map_err(OrdersServiceError::Sql)?;

        let product_uuid = order.product_uuid;

        let cancelled = Order {
            status: OrderStatus::Cancelled,
            cancelled_at: Some(now),
            ..order
        };

        Ok((cancelled, Some(product_uuid)))
    }
}

#[async_trait]
impl OrdersService for PgOrdersService {
    async fn create_order(&self, new_order: NewOrder) -> Result<Order, OrdersServiceError> {
        let mut attempt = 0;

        let order = loop {
            match self.try_create(&new_order).await {
                Err(error) if error.is_transient() && attempt < self.retry.attempts => {
                    attempt += 1;
                    tokio::time::sleep(retry_backoff(attempt - 1, self.retry.backoff)).await;
                }
                Err(error) => return Err(error),
                Ok(order) => break order,
            }
        };

        // Settlement callbacks that raced ahead of this order are waiting in
        // the deferred store; apply them before the caller sees the order.
        if let Err(error) = self.webhooks.replay_deferred(order.uuid).await {
            warn!(order = %order.uuid, "deferred webhook replay failed: {error}");
        }

        match self.get_order(order.uuid).await {
            Ok(order) => Ok(order),
            // The order exists; a failed re-read must not fail the creation.
            Err(_) => Ok(order),
        }
    }

    async fn get_order(&self, order: OrderUuid) -> Result<Order, OrdersServiceError> {
        let mut tx = self.db.begin().await.map_err(OrdersServiceError::Sql)?;

        let order = self.orders.get_order(&mut tx, order).await?;

        tx.commit().await.map_err(OrdersServiceError::Sql)?;

        Ok(order)
    }

    async fn cancel_order(&self, order: OrderUuid) -> Result<Order, OrdersServiceError> {
        let mut attempt = 0;

        loop {
            match self.try_cancel(order).await {
                Err(error) if error.is_transient() && attempt < self.retry.attempts => {
                    attempt += 1;
                    tokio::time::sleep(retry_backoff(attempt - 1, self.retry.backoff)).await;
                }
                Err(error) => return Err(error),
                Ok((order, product)) => {
                    if let Some(product) = product {
                        self.cache.invalidate(product).await;
                    }

                    return Ok(order);
                }
            }
        }
    }

    async fn stale_pending_orders(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Order>, OrdersServiceError> {
        let mut tx = self.db.begin().await.map_err(OrdersServiceError::Sql)?;

        let orders = self.orders.stale_pending(&mut tx, cutoff, limit).await?;

        tx.commit().await.map_err(OrdersServiceError::Sql)?;

        Ok(orders)
    }
}

#[automock]
#[async_trait]
pub trait OrdersService: Send + Sync {
    /// Consume a pending hold into a pending order, snapshotting quantity and
    /// unit price, then replay any settlement callbacks that arrived before
    /// the order existed.
    async fn create_order(&self, new_order: NewOrder) -> Result<Order, OrdersServiceError>;

    /// Retrieve a single order.
    async fn get_order(&self, order: OrderUuid) -> Result<Order, OrdersServiceError>;

    /// Cancel a pending order and return its quantity to the available
    /// counter. Terminal orders are a no-op reporting the current state.
    async fn cancel_order(&self, order: OrderUuid) -> Result<Order, OrdersServiceError>;

    /// Pending orders created at or before `cutoff`, for the payment-window
    /// sweep.
    async fn stale_pending_orders(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Order>, OrdersServiceError>;
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::{
        domain::holds::{
            HoldsService, HoldsServiceError,
            models::{HoldUuid, NewHold},
        },
        test::TestContext,
    };

    use super::*;

    fn order_for(hold: HoldUuid) -> NewOrder {
        NewOrder {
            uuid: OrderUuid::new(),
            hold_uuid: hold,
            customer_email: None,
            customer_details: None,
        }
    }

    #[tokio::test]
    async fn create_order_consumes_hold_and_snapshots_price() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Ticket", 7_500, 4).await;

        let hold = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 2,
                session_id: None,
            })
            .await?;

        let order = ctx
            .orders
            .create_order(NewOrder {
                uuid: OrderUuid::new(),
                hold_uuid: hold.uuid,
                customer_email: Some("buyer@example.com".to_string()),
                customer_details: Some(serde_json::json!({ "country": "GB" })),
            })
            .await?;

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.hold_uuid, hold.uuid);
        assert_eq!(order.quantity, 2);
        assert_eq!(order.unit_price, 7_500);
        assert_eq!(order.total_amount, 15_000);
        assert_eq!(order.customer_email.as_deref(), Some("buyer@example.com"));

        let consumed = ctx.holds.get_hold(hold.uuid).await?;
        assert_eq!(consumed.status, HoldStatus::Consumed);
        assert!(consumed.consumed_at.is_some());

        // The units stay reserved: consuming a hold moves nothing back.
        assert_eq!(ctx.stored_available_stock(product.uuid).await, 2);

        Ok(())
    }

    #[tokio::test]
    async fn create_order_unknown_hold_is_rejected() {
        let ctx = TestContext::new().await;

        let result = ctx.orders.create_order(order_for(HoldUuid::new())).await;

        assert!(
            matches!(result, Err(OrdersServiceError::HoldMissing)),
            "expected HoldMissing, got {result:?}"
        );
    }

    #[tokio::test]
    async fn create_order_expired_hold_is_rejected() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Lapsed Pass", 3_000, 1).await;

        let hold = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 1,
                session_id: None,
            })
            .await?;

        ctx.clock.advance(SignedDuration::from_secs(121));

        let result = ctx.orders.create_order(order_for(hold.uuid)).await;

        assert!(
            matches!(result, Err(OrdersServiceError::HoldExpired)),
            "expected HoldExpired, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn create_order_twice_for_one_hold_is_rejected() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Single Seat", 5_000, 1).await;

        let hold = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 1,
                session_id: None,
            })
            .await?;

        ctx.orders.create_order(order_for(hold.uuid)).await?;

        let result = ctx.orders.create_order(order_for(hold.uuid)).await;

        assert!(
            matches!(result, Err(OrdersServiceError::HoldAlreadyConsumed)),
            "expected HoldAlreadyConsumed, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_orders_and_reservations_settle_exactly() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Console Bundle", 49_900, 5).await;

        let mut holds = Vec::new();

        for _ in 0..5 {
            holds.push(
                ctx.holds
                    .reserve(NewHold {
                        product_uuid: product.uuid,
                        quantity: 1,
                        session_id: None,
                    })
                    .await?,
            );
        }

        let order_tasks: Vec<_> = holds
            .iter()
            .map(|hold| {
                let orders = ctx.orders.clone();
                let hold_uuid = hold.uuid;

                tokio::spawn(async move { orders.create_order(order_for(hold_uuid)).await })
            })
            .collect();

        let reserve_tasks: Vec<_> = (0..5)
            .map(|_| {
                let holds = ctx.holds.clone();
                let product_uuid = product.uuid;

                tokio::spawn(async move {
                    holds
                        .reserve(NewHold {
                            product_uuid,
                            quantity: 1,
                            session_id: None,
                        })
                        .await
                })
            })
            .collect();

        for task in order_tasks {
            let order = task
                .await
                .expect("order task should not panic")
                .expect("each hold converts exactly once");

            assert_eq!(order.status, OrderStatus::Pending);
        }

        for task in reserve_tasks {
            let result = task.await.expect("reserve task should not panic");

            assert!(
                matches!(result, Err(HoldsServiceError::InsufficientStock { .. })),
                "stock is fully reserved, got {result:?}"
            );
        }

        assert_eq!(ctx.stored_available_stock(product.uuid).await, 0);

        Ok(())
    }

    #[tokio::test]
    async fn cancel_order_restores_stock() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Refundable Kit", 9_900, 3).await;

        let hold = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 3,
                session_id: None,
            })
            .await?;

        let order = ctx.orders.create_order(order_for(hold.uuid)).await?;

        assert_eq!(ctx.stored_available_stock(product.uuid).await, 0);

        let cancelled = ctx.orders.cancel_order(order.uuid).await?;

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(ctx.stored_available_stock(product.uuid).await, 3);

        Ok(())
    }

    #[tokio::test]
    async fn cancel_terminal_order_is_a_noop() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Locked Sale", 2_000, 1).await;

        let hold = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 1,
                session_id: None,
            })
            .await?;

        let order = ctx.orders.create_order(order_for(hold.uuid)).await?;

        ctx.orders.cancel_order(order.uuid).await?;
        let second = ctx.orders.cancel_order(order.uuid).await?;

        assert_eq!(second.status, OrderStatus::Cancelled);
        // Only the first cancellation credits the stock back.
        assert_eq!(ctx.stored_available_stock(product.uuid).await, 1);

        Ok(())
    }

    #[tokio::test]
    async fn stock_accounting_stays_exact_across_mixed_outcomes() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Audited Drop", 3_000, 10).await;

        // Hold A becomes an order, hold B stays pending, hold C is released.
        let hold_a = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 2,
                session_id: None,
            })
            .await?;

        ctx.holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 3,
                session_id: None,
            })
            .await?;

        let hold_c = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 1,
                session_id: None,
            })
            .await?;

        let order_a = ctx.orders.create_order(order_for(hold_a.uuid)).await?;
        ctx.holds.release(hold_c.uuid).await?;

        // 10 = 5 available + 3 pending (B) + 2 sold (A).
        assert_eq!(ctx.stored_available_stock(product.uuid).await, 5);

        // Cancelling the order returns its units to the pool.
        ctx.orders.cancel_order(order_a.uuid).await?;

        assert_eq!(ctx.stored_available_stock(product.uuid).await, 7);

        Ok(())
    }

    #[tokio::test]
    async fn stale_pending_orders_respect_the_cutoff() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.seed_product("Slow Checkout", 1_200, 2).await;

        let hold = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 1,
                session_id: None,
            })
            .await?;

        let old_order = ctx.orders.create_order(order_for(hold.uuid)).await?;

        ctx.clock.advance(SignedDuration::from_mins(31));

        let hold = ctx
            .holds
            .reserve(NewHold {
                product_uuid: product.uuid,
                quantity: 1,
                session_id: None,
            })
            .await?;

        let fresh_order = ctx.orders.create_order(order_for(hold.uuid)).await?;

        let cutoff = ctx.clock.now() - SignedDuration::from_mins(30);
        let stale = ctx.orders.stale_pending_orders(cutoff, 100).await?;
        let stale_uuids: Vec<_> = stale.iter().map(|order| order.uuid).collect();

        assert!(stale_uuids.contains(&old_order.uuid));
        assert!(!stale_uuids.contains(&fresh_order.uuid));

        Ok(())
    }
}
