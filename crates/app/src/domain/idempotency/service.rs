//! Idempotency service: slot claim/complete for retried write requests.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use serde_json::Value;
use sqlx::{Postgres, Transaction};

use crate::{
    clock::Clock,
    database::Db,
    domain::idempotency::{
        errors::IdempotencyServiceError,
        models::{ResourceType, Slot},
        repository::PgIdempotencyRepository,
    },
    settings::IdempotencySettings,
};

/// The slot state machine, shared with the webhook processor which claims
/// slots inside its own transactions:
/// * no record → insert locked-incomplete, caller runs the operation;
/// * completed, same fingerprint → replay the cached response;
/// * completed, different fingerprint → key reuse, reject;
/// * incomplete, young lock → busy, caller retries later;
/// * incomplete, stale lock → take the lock over and run.
pub(crate) async fn claim_slot(
    repository: &PgIdempotencyRepository,
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
    resource: ResourceType,
    fingerprint: &str,
    now: Timestamp,
    settings: &IdempotencySettings,
) -> Result<Slot, sqlx::Error> {
    let expires_at = now + settings.ttl_for(resource);

    if repository
        .try_insert(tx, key, resource, fingerprint, now, expires_at)
        .await?
    {
        return Ok(Slot::Fresh);
    }

    let Some(record) = repository.get_record(tx, key, resource).await? else {
        // The record was purged between the conflicting insert and our read;
        // claim it outright.
        return Ok(
            if repository
                .try_insert(tx, key, resource, fingerprint, now, expires_at)
                .await?
            {
                Slot::Fresh
            } else {
                Slot::Busy
            },
        );
    };

    if record.is_completed() {
        if record.fingerprint == fingerprint {
            return Ok(Slot::Replayed {
                status: record.response_status.unwrap_or(200),
                body: record.response_body.unwrap_or(Value::Null),
            });
        }

        return Ok(Slot::KeyReuse);
    }

    let stale_before = now - settings.lock_takeover_after;

    if record.locked_at > stale_before {
        return Ok(Slot::Busy);
    }

    Ok(
        if repository
            .take_over_lock(tx, key, resource, fingerprint, now, stale_before)
            .await?
        {
            Slot::Fresh
        } else {
            Slot::Busy
        },
    )
}

#[derive(Clone)]
pub struct PgIdempotencyService {
    db: Db,
    clock: Arc<dyn Clock>,
    settings: IdempotencySettings,
    repository: PgIdempotencyRepository,
}

impl PgIdempotencyService {
    #[must_use]
    pub fn new(db: Db, clock: Arc<dyn Clock>, settings: IdempotencySettings) -> Self {
        Self {
            db,
            clock,
            settings,
            repository: PgIdempotencyRepository::new(),
        }
    }
}

#[async_trait]
impl IdempotencyService for PgIdempotencyService {
    async fn begin(
        &self,
        key: &str,
        resource: ResourceType,
        fingerprint: &str,
    ) -> Result<Slot, IdempotencyServiceError> {
        let mut tx = self.db.begin().await?;

        let slot = claim_slot(
            &self.repository,
            &mut tx,
            key,
            resource,
            fingerprint,
            self.clock.now(),
            &self.settings,
        )
        .await?;

        tx.commit().await?;

        Ok(slot)
    }

    async fn complete(
        &self,
        key: &str,
        resource: ResourceType,
        status: u16,
        body: Value,
    ) -> Result<(), IdempotencyServiceError> {
        let mut tx = self.db.begin().await?;

        self.repository
            .complete(&mut tx, key, resource, self.clock.now(), status, &body)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, IdempotencyServiceError> {
        let mut tx = self.db.begin().await?;

        let purged = self
            .repository
            .purge_expired(&mut tx, self.clock.now())
            .await?;

        tx.commit().await?;

        Ok(purged)
    }
}

#[automock]
#[async_trait]
pub trait IdempotencyService: Send + Sync {
    /// Claim the slot for `(key, resource)`. [`Slot::Fresh`] hands the caller
    /// the duty to run the operation and [`IdempotencyService::complete`] the
    /// record afterwards.
    async fn begin(
        &self,
        key: &str,
        resource: ResourceType,
        fingerprint: &str,
    ) -> Result<Slot, IdempotencyServiceError>;

    /// Record the response to replay for future duplicates.
    async fn complete(
        &self,
        key: &str,
        resource: ResourceType,
        status: u16,
        body: Value,
    ) -> Result<(), IdempotencyServiceError>;

    /// Drop records past their per-resource-type TTL.
    async fn purge_expired(&self) -> Result<u64, IdempotencyServiceError>;
}
