//! Background reclamation: expired holds, stale pending orders, and aged
//! idempotency records.
//!
//! At most one sweeper instance runs at a time across the fleet, enforced by
//! an atomic lease row. A run that cannot claim the lease is skipped, never
//! queued.

use std::sync::Arc;

use thiserror::Error;
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    database::Db,
    domain::{
        holds::{
            errors::HoldsServiceError,
            models::ReleaseOutcome,
            repository::PgSweepLeaseRepository,
            service::HoldsService,
        },
        idempotency::{errors::IdempotencyServiceError, service::IdempotencyService},
        orders::{errors::OrdersServiceError, service::OrdersService},
    },
    settings::SweepSettings,
};

const LEASE_NAME: &str = "hold_sweep";

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("lease error")]
    Lease(#[source] sqlx::Error),

    #[error(transparent)]
    Holds(#[from] HoldsServiceError),

    #[error(transparent)]
    Orders(#[from] OrdersServiceError),

    #[error(transparent)]
    Idempotency(#[from] IdempotencyServiceError),
}

/// What one sweep run accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub released_holds: u64,
    pub skipped_holds: u64,
    pub cancelled_orders: u64,
    pub purged_records: u64,
}

impl SweepReport {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct HoldSweeper {
    db: Db,
    clock: Arc<dyn Clock>,
    holds: Arc<dyn HoldsService>,
    orders: Arc<dyn OrdersService>,
    idempotency: Arc<dyn IdempotencyService>,
    settings: SweepSettings,
    leases: PgSweepLeaseRepository,
    holder: Uuid,
}

impl HoldSweeper {
    #[must_use]
    pub fn new(
        db: Db,
        clock: Arc<dyn Clock>,
        holds: Arc<dyn HoldsService>,
        orders: Arc<dyn OrdersService>,
        idempotency: Arc<dyn IdempotencyService>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            db,
            clock,
            holds,
            orders,
            idempotency,
            settings,
            leases: PgSweepLeaseRepository::new(),
            holder: Uuid::now_v7(),
        }
    }

    /// Tick until shutdown. A failed run is logged; the next tick retries.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep(Some(&shutdown)).await {
                        Ok(Some(report)) if !report.is_empty() => {
                            info!(
                                released = report.released_holds,
                                skipped = report.skipped_holds,
                                cancelled = report.cancelled_orders,
                                purged = report.purged_records,
                                "sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => warn!("sweep failed: {error}"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("hold sweeper stopping");
                    return;
                }
            }
        }
    }

    /// One sweep run. Returns `None` when the lease is held elsewhere.
    pub async fn sweep_once(&self) -> Result<Option<SweepReport>, SweepError> {
        self.sweep(None).await
    }

    async fn sweep(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<Option<SweepReport>, SweepError> {
        if !self.claim_lease().await? {
            debug!("sweep lease held elsewhere, skipping run");
            return Ok(None);
        }

        let result = self.sweep_holding_lease(shutdown).await;

        self.release_lease().await;

        result.map(Some)
    }

    async fn sweep_holding_lease(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<SweepReport, SweepError> {
        let mut report = SweepReport::default();

        for hold in self.holds.expired_holds(self.settings.batch_size).await? {
            match self.holds.release(hold.uuid).await {
                Ok(ReleaseOutcome::Released) => report.released_holds += 1,
                Ok(ReleaseOutcome::AlreadyExpired) => {}
                // Consumed between selection and release; someone converted
                // it into an order.
                Err(HoldsServiceError::AlreadyConsumed) => report.skipped_holds += 1,
                Err(error) => {
                    warn!(hold = %hold.uuid, "failed to release expired hold: {error}");
                }
            }

            // On shutdown, finish the hold in flight and stop.
            if shutdown.is_some_and(|signal| *signal.borrow()) {
                return Ok(report);
            }
        }

        let cutoff = self.clock.now() - self.settings.payment_window;

        for order in self
            .orders
            .stale_pending_orders(cutoff, self.settings.batch_size)
            .await?
        {
            match self.orders.cancel_order(order.uuid).await {
                Ok(_) => report.cancelled_orders += 1,
                Err(error) => {
                    warn!(order = %order.uuid, "failed to cancel stale order: {error}");
                }
            }

            if shutdown.is_some_and(|signal| *signal.borrow()) {
                return Ok(report);
            }
        }

        match self.idempotency.purge_expired().await {
            Ok(purged) => report.purged_records = purged,
            Err(error) => warn!("failed to purge idempotency records: {error}"),
        }

        Ok(report)
    }

    async fn claim_lease(&self) -> Result<bool, SweepError> {
        let now = self.clock.now();

        let mut tx = self.db.begin().await.map_err(SweepError::Lease)?;

        let claimed = self
            .leases
            .claim(
                &mut tx,
                LEASE_NAME,
                self.holder,
                now + self.settings.lease_ttl,
                now,
            )
            .await
            .map_err(SweepError::Lease)?;

        tx.commit().await.map_err(SweepError::Lease)?;

        Ok(claimed)
    }

    /// Best-effort: an unreleased lease simply ages out.
    async fn release_lease(&self) {
        let released = async {
            let mut tx = self.db.begin().await?;
            self.leases.release(&mut tx, LEASE_NAME, self.holder).await?;
            tx.commit().await
        }
        .await;

        if let Err(error) = released {
            warn!("failed to release sweep lease: {error}");
        }
    }
}
