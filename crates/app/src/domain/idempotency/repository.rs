//! Idempotency Repository
//!
//! The `(key, resource_type)` primary key makes the insert the mutual
//! exclusion point between concurrent duplicates.

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use serde_json::Value;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};

use crate::domain::idempotency::models::{IdempotencyRecord, ResourceType};

const INSERT_RECORD_SQL: &str = include_str!("sql/insert_record.sql");
const GET_RECORD_SQL: &str = include_str!("sql/get_record.sql");
const TAKE_OVER_LOCK_SQL: &str = include_str!("sql/take_over_lock.sql");
const COMPLETE_RECORD_SQL: &str = include_str!("sql/complete_record.sql");
const REOPEN_RECORD_SQL: &str = include_str!("sql/reopen_record.sql");
const PURGE_EXPIRED_SQL: &str = include_str!("sql/purge_expired.sql");

/// Response status recorded when a webhook is parked for a missing order.
/// Reopening keys off this value during deferred replay.
pub(crate) const DEFERRED_STATUS: u16 = 202;

#[derive(Debug, Clone, Default)]
pub(crate) struct PgIdempotencyRepository;

impl PgIdempotencyRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Insert a locked-incomplete record; false when the slot already exists.
    pub(crate) async fn try_insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        resource: ResourceType,
        fingerprint: &str,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let inserted = query(INSERT_RECORD_SQL)
            .bind(key)
            .bind(resource.as_str())
            .bind(fingerprint)
            .bind(SqlxTimestamp::from(now))
            .bind(SqlxTimestamp::from(expires_at))
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(inserted == 1)
    }

    pub(crate) async fn get_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        resource: ResourceType,
    ) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
        query_as::<Postgres, IdempotencyRecord>(GET_RECORD_SQL)
            .bind(key)
            .bind(resource.as_str())
            .fetch_optional(&mut **tx)
            .await
    }

    /// Steal the lock of an incomplete record whose holder went quiet.
    /// Returns false when the lock is still live (or the record completed).
    pub(crate) async fn take_over_lock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        resource: ResourceType,
        fingerprint: &str,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let taken = query(TAKE_OVER_LOCK_SQL)
            .bind(key)
            .bind(resource.as_str())
            .bind(SqlxTimestamp::from(now))
            .bind(fingerprint)
            .bind(SqlxTimestamp::from(stale_before))
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(taken == 1)
    }

    pub(crate) async fn complete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        resource: ResourceType,
        now: Timestamp,
        status: u16,
        body: &Value,
    ) -> Result<(), sqlx::Error> {
        query(COMPLETE_RECORD_SQL)
            .bind(key)
            .bind(resource.as_str())
            .bind(SqlxTimestamp::from(now))
            .bind(i32::from(status))
            .bind(body)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Re-arm a record completed with the deferred response so the stored
    /// callback can be applied for real. Returns false when the record holds
    /// a final response already.
    pub(crate) async fn reopen_deferred(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        resource: ResourceType,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let reopened = query(REOPEN_RECORD_SQL)
            .bind(key)
            .bind(resource.as_str())
            .bind(SqlxTimestamp::from(now))
            .bind(i32::from(DEFERRED_STATUS))
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(reopened == 1)
    }

    pub(crate) async fn purge_expired(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let purged = query(PURGE_EXPIRED_SQL)
            .bind(SqlxTimestamp::from(now))
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(purged)
    }
}

impl<'r> FromRow<'r, PgRow> for IdempotencyRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let response_status: Option<i32> = row.try_get("response_status")?;

        let response_status = response_status
            .map(|status| {
                u16::try_from(status).map_err(|e| sqlx::Error::ColumnDecode {
                    index: "response_status".to_string(),
                    source: Box::new(e),
                })
            })
            .transpose()?;

        Ok(Self {
            key: row.try_get("key")?,
            resource_type: row.try_get("resource_type")?,
            fingerprint: row.try_get("fingerprint")?,
            response_status,
            response_body: row.try_get("response_body")?,
            locked_at: row.try_get::<SqlxTimestamp, _>("locked_at")?.to_jiff(),
            completed_at: row
                .try_get::<Option<SqlxTimestamp>, _>("completed_at")?
                .map(SqlxTimestamp::to_jiff),
            expires_at: row.try_get::<SqlxTimestamp, _>("expires_at")?.to_jiff(),
        })
    }
}
