//! Database connection management

use std::time::Duration;

use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error when starting the transaction fails.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect to `PostgreSQL`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

/// Whether a statement failed because Postgres chose this transaction as a
/// deadlock or serialization victim. The transaction has been rolled back and
/// the whole operation may be retried from the top.
#[must_use]
pub fn is_serialization_failure(error: &sqlx::Error) -> bool {
    matches!(
        error
            .as_database_error()
            .and_then(|db_error| db_error.code())
            .as_deref(),
        Some("40001" | "40P01")
    )
}

/// Exponential backoff with uniform jitter for deadlock retries.
///
/// `attempt` is zero-based: the first retry waits roughly `base`, the second
/// roughly `2 * base`, and so on.
#[must_use]
pub fn retry_backoff(attempt: u32, base: Duration) -> Duration {
    let exp = base.saturating_mul(1 << attempt.min(6));

    if base.is_zero() {
        return exp;
    }

    exp + rand::thread_rng().gen_range(Duration::ZERO..base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_per_attempt() {
        let base = Duration::from_millis(100);

        let first = retry_backoff(0, base);
        let third = retry_backoff(2, base);

        assert!(first >= base && first < base * 2);
        assert!(third >= base * 4 && third < base * 5);
    }

    #[test]
    fn backoff_with_zero_base_is_zero() {
        assert_eq!(retry_backoff(3, Duration::ZERO), Duration::ZERO);
    }
}
