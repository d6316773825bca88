// ── Response cache ──
//
// Time-boxed memoization for expensive reads. Entries are type-erased so
// one cache serves every read operation; a lookup with the wrong type is a
// miss. Failed fetches are never stored.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// Hit/miss counters and current entry count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Bumped by `invalidate_all` so a fetch that started before the
    /// invalidation cannot repopulate the cache afterwards.
    epoch: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live value for `key`, or run `fetch` and store its result
    /// for `ttl`.
    ///
    /// Errors from `fetch` are returned unchanged and nothing is stored.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let value = fetch().await?;
        if self.epoch.load(Ordering::Acquire) == epoch {
            self.insert(key, value.clone(), ttl);
        } else {
            trace!(key, "cache invalidated during fetch, not storing");
        }
        Ok(value)
    }

    /// Look up a live value, counting a hit or a miss.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.value.downcast_ref::<T>().cloned());

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key, "cache miss");
        }
        found
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: &str, value: T, ttl: Duration) {
        self.entries.insert(
            key.to_owned(),
            CacheEntry {
                value: Arc::new(value),
                fetched_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
