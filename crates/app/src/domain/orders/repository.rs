//! Orders Repository

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use serde_json::Value;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};
use uuid::Uuid;

use crate::domain::{
    holds::models::HoldUuid,
    orders::models::{Order, OrderStatus, OrderUuid},
    products::repository::{to_db_amount, try_get_amount},
};

const CREATE_ORDER_SQL: &str = include_str!("sql/create_order.sql");
const GET_ORDER_SQL: &str = include_str!("sql/get_order.sql");
const LOCK_ORDER_SQL: &str = include_str!("sql/lock_order.sql");
const MARK_PAID_SQL: &str = include_str!("sql/mark_paid.sql");
const MARK_FAILED_SQL: &str = include_str!("sql/mark_failed.sql");
const MARK_CANCELLED_SQL: &str = include_str!("sql/mark_cancelled.sql");
const STALE_PENDING_SQL: &str = include_str!("sql/stale_pending.sql");

/// Value snapshot inserted when a hold is consumed.
#[derive(Debug, Clone)]
pub(crate) struct OrderRow<'a> {
    pub(crate) uuid: OrderUuid,
    pub(crate) product_uuid: Uuid,
    pub(crate) hold_uuid: HoldUuid,
    pub(crate) quantity: u64,
    pub(crate) unit_price: u64,
    pub(crate) customer_email: Option<&'a str>,
    pub(crate) customer_details: Option<&'a Value>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgOrdersRepository;

impl PgOrdersRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        row: OrderRow<'_>,
        now: Timestamp,
    ) -> Result<Order, sqlx::Error> {
        let total = row
            .quantity
            .checked_mul(row.unit_price)
            .ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "total_amount".to_string(),
                source: "order total overflows".into(),
            })?;

        query_as::<Postgres, Order>(CREATE_ORDER_SQL)
            .bind(row.uuid.into_uuid())
            .bind(row.product_uuid)
            .bind(row.hold_uuid.into_uuid())
            .bind(to_db_amount(row.quantity, "quantity")?)
            .bind(to_db_amount(row.unit_price, "unit_price")?)
            .bind(to_db_amount(total, "total_amount")?)
            .bind(row.customer_email)
            .bind(row.customer_details)
            .bind(SqlxTimestamp::from(now))
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn get_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(GET_ORDER_SQL)
            .bind(order.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    /// Read the order row under an exclusive lock; settlement callbacks for
    /// the same order serialize here.
    pub(crate) async fn lock_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(LOCK_ORDER_SQL)
            .bind(order.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn mark_paid(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
        now: Timestamp,
        payment_reference: &str,
    ) -> Result<(), sqlx::Error> {
        query(MARK_PAID_SQL)
            .bind(order.into_uuid())
            .bind(SqlxTimestamp::from(now))
            .bind(payment_reference)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(crate) async fn mark_failed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
        now: Timestamp,
        payment_reference: &str,
    ) -> Result<(), sqlx::Error> {
        query(MARK_FAILED_SQL)
            .bind(order.into_uuid())
            .bind(SqlxTimestamp::from(now))
            .bind(payment_reference)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(crate) async fn mark_cancelled(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        query(MARK_CANCELLED_SQL)
            .bind(order.into_uuid())
            .bind(SqlxTimestamp::from(now))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Pending orders created at or before `cutoff`, oldest first.
    pub(crate) async fn stale_pending(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Order>, sqlx::Error> {
        query_as::<Postgres, Order>(STALE_PENDING_SQL)
            .bind(SqlxTimestamp::from(cutoff))
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for Order {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;

        let status = OrderStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown order status {status:?}").into(),
        })?;

        Ok(Self {
            uuid: OrderUuid::from_uuid(row.try_get("uuid")?),
            product_uuid: row.try_get::<Uuid, _>("product_uuid")?.into(),
            hold_uuid: HoldUuid::from_uuid(row.try_get("hold_uuid")?),
            quantity: try_get_amount(row, "quantity")?,
            unit_price: try_get_amount(row, "unit_price")?,
            total_amount: try_get_amount(row, "total_amount")?,
            status,
            customer_email: row.try_get("customer_email")?,
            customer_details: row.try_get("customer_details")?,
            payment_reference: row.try_get("payment_reference")?,
            paid_at: row
                .try_get::<Option<SqlxTimestamp>, _>("paid_at")?
                .map(SqlxTimestamp::to_jiff),
            cancelled_at: row
                .try_get::<Option<SqlxTimestamp>, _>("cancelled_at")?
                .map(SqlxTimestamp::to_jiff),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        })
    }
}
