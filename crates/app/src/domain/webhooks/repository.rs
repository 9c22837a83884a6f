//! Deferred and dead-lettered webhook storage.

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use serde_json::Value;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};
use uuid::Uuid;

use crate::domain::{
    orders::models::OrderUuid,
    webhooks::models::{DeferredWebhook, DeferredWebhookUuid},
};

const INSERT_DEFERRED_SQL: &str = include_str!("sql/insert_deferred.sql");
const DEFERRED_FOR_ORDER_SQL: &str = include_str!("sql/deferred_for_order.sql");
const DELETE_DEFERRED_SQL: &str = include_str!("sql/delete_deferred.sql");
const INSERT_FAILED_SQL: &str = include_str!("sql/insert_failed.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgDeferredWebhooksRepository;

impl PgDeferredWebhooksRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: DeferredWebhookUuid,
        order: OrderUuid,
        payload: &Value,
        idempotency_key: &str,
        received_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        query(INSERT_DEFERRED_SQL)
            .bind(uuid.into_uuid())
            .bind(order.into_uuid())
            .bind(payload)
            .bind(idempotency_key)
            .bind(SqlxTimestamp::from(received_at))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Stored callbacks for an order in arrival order.
    pub(crate) async fn for_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
    ) -> Result<Vec<DeferredWebhook>, sqlx::Error> {
        query_as::<Postgres, DeferredWebhook>(DEFERRED_FOR_ORDER_SQL)
            .bind(order.into_uuid())
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn delete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: DeferredWebhookUuid,
    ) -> Result<(), sqlx::Error> {
        query(DELETE_DEFERRED_SQL)
            .bind(uuid.into_uuid())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Park a callback that kept failing; never blocks other processing.
    pub(crate) async fn insert_failed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: Option<OrderUuid>,
        payload: &Value,
        idempotency_key: Option<&str>,
        error: &str,
        attempts: u32,
        failed_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        query(INSERT_FAILED_SQL)
            .bind(Uuid::now_v7())
            .bind(order.map(OrderUuid::into_uuid))
            .bind(payload)
            .bind(idempotency_key)
            .bind(error)
            .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
            .bind(SqlxTimestamp::from(failed_at))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

impl<'r> FromRow<'r, PgRow> for DeferredWebhook {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: DeferredWebhookUuid::from_uuid(row.try_get("uuid")?),
            order_uuid: OrderUuid::from_uuid(row.try_get("order_uuid")?),
            payload: row.try_get("payload")?,
            idempotency_key: row.try_get("idempotency_key")?,
            received_at: row.try_get::<SqlxTimestamp, _>("received_at")?.to_jiff(),
        })
    }
}
