//! Non-authoritative cache of computed available stock.
//!
//! The cache serves display reads only; the reservation decision always runs
//! against the store under a row lock. Every write that changes
//! `available_stock` invalidates the corresponding entry after commit.

use std::{future::Future, pin::Pin};

use async_trait::async_trait;

use crate::domain::products::models::ProductUuid;

mod memory;

pub use memory::MemoryStockCache;

/// Store read used to fill a cache miss.
pub type StockLoader<'a> =
    Pin<Box<dyn Future<Output = Result<u64, sqlx::Error>> + Send + 'a>>;

/// A cached available-stock value. `fresh` is false once the entry has
/// outlived its TTL; stale values are still returned so display paths can
/// degrade gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedStock {
    pub available: u64,
    pub fresh: bool,
}

#[async_trait]
pub trait StockCache: Send + Sync {
    async fn get(&self, product: ProductUuid) -> Option<CachedStock>;

    async fn put(&self, product: ProductUuid, available: u64);

    async fn invalidate(&self, product: ProductUuid);

    /// Read-through with single-flight collapsing: concurrent misses for the
    /// same key run `loader` at most once, with waiters sharing the result
    /// after a bounded wait.
    async fn load(
        &self,
        product: ProductUuid,
        loader: StockLoader<'_>,
    ) -> Result<u64, sqlx::Error>;
}
