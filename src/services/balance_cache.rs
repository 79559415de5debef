//! Per-process TTL cache in front of `balance_engine::compute_balances`.
//! Balance computation reads the full expense/settlement history for a
//! group; under heavy read traffic (a shared group's dashboard, polled by
//! several clients) recomputing on every request is wasted work, so this
//! cache holds the result for a short, configurable window and is
//! invalidated explicitly whenever an expense or settlement changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AppResult;
use crate::services::balance_engine::{self, BalanceSummary};

struct CachedEntry {
    summary: Arc<BalanceSummary>,
    computed_at: Instant,
}

#[derive(Clone)]
pub struct BalanceCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<i64, CachedEntry>>>,
}

impl BalanceCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the cached summary if it's still fresh, recomputing and
    /// repopulating the cache otherwise.
    pub async fn get_or_compute(
        &self,
        pool: &sqlx::SqlitePool,
        group_id: i64,
    ) -> AppResult<Arc<BalanceSummary>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&group_id) {
                if entry.computed_at.elapsed() < self.ttl {
                    return Ok(entry.summary.clone());
                }
            }
        }

        let summary = Arc::new(balance_engine::compute_balances(pool, group_id).await?);

        let mut entries = self.entries.write().await;
        entries.insert(
            group_id,
            CachedEntry {
                summary: summary.clone(),
                computed_at: Instant::now(),
            },
        );

        Ok(summary)
    }

    /// Drops the cached entry for a group. Called whenever an expense,
    /// settlement, or membership change could have altered its balances.
    pub async fn invalidate(&self, group_id: i64) {
        self.entries.write().await.remove(&group_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn empty_pool() -> sqlx::SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn caches_until_invalidated() {
        let pool = empty_pool().await;
        let cache = BalanceCache::new(60);

        let first = cache.get_or_compute(&pool, 1).await.unwrap();
        let second = cache.get_or_compute(&pool, 1).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate(1).await;
        let third = cache.get_or_compute(&pool, 1).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let pool = empty_pool().await;
        let cache = BalanceCache::new(0);

        let first = cache.get_or_compute(&pool, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.get_or_compute(&pool, 1).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
