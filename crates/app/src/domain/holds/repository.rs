//! Holds Repository

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};
use uuid::Uuid;

use crate::domain::{
    holds::models::{Hold, HoldStatus, HoldUuid, NewHold},
    products::repository::{to_db_amount, try_get_amount},
};

const CREATE_HOLD_SQL: &str = include_str!("sql/create_hold.sql");
const GET_HOLD_SQL: &str = include_str!("sql/get_hold.sql");
const LOCK_HOLD_SQL: &str = include_str!("sql/lock_hold.sql");
const MARK_CONSUMED_SQL: &str = include_str!("sql/mark_consumed.sql");
const MARK_EXPIRED_SQL: &str = include_str!("sql/mark_expired.sql");
const EXPIRED_PENDING_SQL: &str = include_str!("sql/expired_pending.sql");
const CLAIM_LEASE_SQL: &str = include_str!("sql/claim_lease.sql");
const RELEASE_LEASE_SQL: &str = include_str!("sql/release_lease.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgHoldsRepository;

impl PgHoldsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_hold(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hold: HoldUuid,
        new_hold: &NewHold,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<Hold, sqlx::Error> {
        query_as::<Postgres, Hold>(CREATE_HOLD_SQL)
            .bind(hold.into_uuid())
            .bind(new_hold.product_uuid.into_uuid())
            .bind(to_db_amount(new_hold.quantity, "quantity")?)
            .bind(new_hold.session_id.as_deref())
            .bind(SqlxTimestamp::from(expires_at))
            .bind(SqlxTimestamp::from(now))
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn get_hold(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hold: HoldUuid,
    ) -> Result<Hold, sqlx::Error> {
        query_as::<Postgres, Hold>(GET_HOLD_SQL)
            .bind(hold.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    /// Read the hold row under an exclusive lock. Consumption and expiry of
    /// the same hold serialize here.
    pub(crate) async fn lock_hold(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hold: HoldUuid,
    ) -> Result<Hold, sqlx::Error> {
        query_as::<Postgres, Hold>(LOCK_HOLD_SQL)
            .bind(hold.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn mark_consumed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hold: HoldUuid,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        query(MARK_CONSUMED_SQL)
            .bind(hold.into_uuid())
            .bind(SqlxTimestamp::from(now))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(crate) async fn mark_expired(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        hold: HoldUuid,
    ) -> Result<(), sqlx::Error> {
        query(MARK_EXPIRED_SQL)
            .bind(hold.into_uuid())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Pending holds past their deadline, oldest deadline first.
    pub(crate) async fn expired_pending(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Hold>, sqlx::Error> {
        query_as::<Postgres, Hold>(EXPIRED_PENDING_SQL)
            .bind(SqlxTimestamp::from(now))
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
    }
}

/// Lease rows backing the at-most-one-sweeper guarantee.
#[derive(Debug, Clone, Default)]
pub(crate) struct PgSweepLeaseRepository;

impl PgSweepLeaseRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Atomically claim (or re-claim) the named lease. Returns false when a
    /// live lease is held by someone else.
    pub(crate) async fn claim(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        holder: Uuid,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let claimed: Option<Uuid> = query_as::<Postgres, (Uuid,)>(CLAIM_LEASE_SQL)
            .bind(name)
            .bind(holder)
            .bind(SqlxTimestamp::from(expires_at))
            .bind(SqlxTimestamp::from(now))
            .fetch_optional(&mut **tx)
            .await?
            .map(|row| row.0);

        Ok(claimed == Some(holder))
    }

    pub(crate) async fn release(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        holder: Uuid,
    ) -> Result<(), sqlx::Error> {
        query(RELEASE_LEASE_SQL)
            .bind(name)
            .bind(holder)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

impl<'r> FromRow<'r, PgRow> for Hold {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;

        let status = HoldStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown hold status {status:?}").into(),
        })?;

        Ok(Self {
            uuid: HoldUuid::from_uuid(row.try_get("uuid")?),
            product_uuid: row.try_get::<Uuid, _>("product_uuid")?.into(),
            quantity: try_get_amount(row, "quantity")?,
            session_id: row.try_get("session_id")?,
            status,
            expires_at: row.try_get::<SqlxTimestamp, _>("expires_at")?.to_jiff(),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            consumed_at: row
                .try_get::<Option<SqlxTimestamp>, _>("consumed_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}
