//! In-process stock cache shared across request handlers.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    cache::{CachedStock, StockCache, StockLoader},
    clock::Clock,
    domain::products::models::ProductUuid,
    settings::CacheSettings,
};

#[derive(Debug, Clone, Copy)]
struct Entry {
    available: u64,
    expires_at: Timestamp,
}

pub struct MemoryStockCache {
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    entries: DashMap<Uuid, Entry>,
    // Per-key flight locks; whichever miss acquires the lock first runs its
    // loader, the rest re-check the entry once the lock frees up.
    flights: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl MemoryStockCache {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, settings: CacheSettings) -> Self {
        Self {
            clock,
            settings,
            entries: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    fn fresh_value(&self, product: Uuid) -> Option<u64> {
        let entry = self.entries.get(&product)?;

        (self.clock.now() < entry.expires_at).then_some(entry.available)
    }

    fn flight_lock(&self, product: Uuid) -> Arc<Mutex<()>> {
        self.flights
            .entry(product)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl StockCache for MemoryStockCache {
    async fn get(&self, product: ProductUuid) -> Option<CachedStock> {
        let entry = self.entries.get(&product.into_uuid())?;

        Some(CachedStock {
            available: entry.available,
            fresh: self.clock.now() < entry.expires_at,
        })
    }

    async fn put(&self, product: ProductUuid, available: u64) {
        self.entries.insert(
            product.into_uuid(),
            Entry {
                available,
                expires_at: self.clock.now() + self.settings.stock_ttl,
            },
        );
    }

    async fn invalidate(&self, product: ProductUuid) {
        self.entries.remove(&product.into_uuid());
    }

    async fn load(
        &self,
        product: ProductUuid,
        loader: StockLoader<'_>,
    ) -> Result<u64, sqlx::Error> {
        let key = product.into_uuid();

        if let Some(available) = self.fresh_value(key) {
            return Ok(available);
        }

        let lock = self.flight_lock(key);

        match tokio::time::timeout(self.settings.flight_wait, lock.lock()).await {
            Ok(_guard) => {
                // The flight that held the lock before us may have already
                // filled the entry.
                if let Some(available) = self.fresh_value(key) {
                    return Ok(available);
                }

                let available = loader.await?;
                self.put(product, available).await;

                Ok(available)
            }
            // Bounded wait elapsed; fall through to our own store read
            // without touching the entry.
            Err(_elapsed) => loader.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use jiff::SignedDuration;

    use crate::clock::FrozenClock;

    use super::*;

    fn cache_with_clock() -> (Arc<FrozenClock>, MemoryStockCache) {
        let clock = Arc::new(FrozenClock::new(Timestamp::UNIX_EPOCH));

        let cache = MemoryStockCache::new(clock.clone(), CacheSettings::default());

        (clock, cache)
    }

    #[tokio::test]
    async fn get_returns_fresh_then_stale() {
        let (clock, cache) = cache_with_clock();
        let product = ProductUuid::new();

        cache.put(product, 7).await;

        let hit = cache.get(product).await.expect("entry should exist");
        assert!(hit.fresh);
        assert_eq!(hit.available, 7);

        clock.advance(SignedDuration::from_secs(31));

        let hit = cache.get(product).await.expect("entry should persist");
        assert!(!hit.fresh);
        assert_eq!(hit.available, 7);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let (_clock, cache) = cache_with_clock();
        let product = ProductUuid::new();

        cache.put(product, 3).await;
        cache.invalidate(product).await;

        assert!(cache.get(product).await.is_none());
    }

    #[tokio::test]
    async fn load_fills_and_serves_from_cache() {
        let (_clock, cache) = cache_with_clock();
        let product = ProductUuid::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let loaded = cache
                .load(product, {
                    let loads = &loads;
                    Box::pin(async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(42)
                    })
                })
                .await
                .expect("load should succeed");

            assert_eq!(loaded, 42);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_collapse_to_one() {
        let (_clock, cache) = cache_with_clock();
        let cache = Arc::new(cache);
        let product = ProductUuid::new();
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let loads = loads.clone();

                tokio::spawn(async move {
                    cache
                        .load(
                            product,
                            Box::pin(async move {
                                loads.fetch_add(1, Ordering::SeqCst);
                                Ok(9)
                            }),
                        )
                        .await
                })
            })
            .collect();

        for task in tasks {
            let loaded = task
                .await
                .expect("task should not panic")
                .expect("load should succeed");

            assert_eq!(loaded, 9);
        }

        // Instant loaders cannot tell apart one flight from few; the point is
        // that eight callers did not produce eight loads.
        assert!(loads.load(Ordering::SeqCst) < 8);
    }

    #[tokio::test]
    async fn load_error_is_not_cached() {
        let (_clock, cache) = cache_with_clock();
        let product = ProductUuid::new();

        let result = cache
            .load(product, Box::pin(async { Err(sqlx::Error::RowNotFound) }))
            .await;

        assert!(result.is_err());
        assert!(cache.get(product).await.is_none());

        let loaded = cache
            .load(product, Box::pin(async { Ok(5) }))
            .await
            .expect("subsequent load should succeed");

        assert_eq!(loaded, 5);
    }
}
