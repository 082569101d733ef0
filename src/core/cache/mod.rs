//! Timeline Caches
//!
//! Completed months of transit data and completed ephemeris ranges are
//! kept in an injected [`CacheStore`]. The store is the only mutable state
//! shared between concurrent requests; it is never locked across a fetch,
//! so two callers missing the same key both compute it and the last write
//! wins. Writes are whole-value replacements of immutable content, so this
//! only costs duplicate work.
//!
//! # Policies
//!
//! - **Size**: at most `max_entries` live entries, oldest evicted first
//! - **Age**: entries older than `ttl` read as misses
//! - **Epoch**: entries stamped with another schema epoch read as misses
//!
//! A miss is always possible and never an error: store failures are
//! logged and reported as misses by the [`MonthCache`] and
//! [`EphemerisCache`] facades.

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::MemoryCache;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::calendar::{DateWindow, MonthKey};
use super::error::Result;
use super::models::{EphemerisDay, TransitDayData};

// =============================================================================
// Constants
// =============================================================================

/// Cache schema epoch (bump to invalidate every existing entry)
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Default maximum entry age (30 days)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Default maximum number of entries
pub const DEFAULT_CACHE_ENTRIES: usize = 240;

// =============================================================================
// Policy & Store Interface
// =============================================================================

/// Bounded size/age policy handed to a store at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_entries: usize,
    pub ttl: Duration,
    pub epoch: u32,
}

impl CachePolicy {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            epoch: CACHE_SCHEMA_VERSION,
        }
    }

    /// Same policy under another schema epoch
    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = epoch;
        self
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_ENTRIES, DEFAULT_CACHE_TTL)
    }
}

/// Asynchronous keyed store. Keys are case-sensitive exact matches.
#[async_trait]
pub trait CacheStore<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Read a live entry
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// Replace the entry for `key`
    async fn set(&self, key: &str, value: V) -> Result<()>;

    /// Drop the entry for `key`, if any
    async fn evict(&self, key: &str) -> Result<()>;

    /// Drop every entry
    async fn clear(&self) -> Result<()>;
}

/// Store that never holds anything (`--no-cache`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl<V> CacheStore<V> for NoopCache
where
    V: Send + Sync + 'static,
{
    async fn get(&self, _key: &str) -> Result<Option<V>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: V) -> Result<()> {
        Ok(())
    }

    async fn evict(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Month Cache
// =============================================================================

/// Complete calendar months of transit data, keyed by `(subjectId, yyyy-mm)`.
#[derive(Clone)]
pub struct MonthCache {
    store: Arc<dyn CacheStore<Vec<TransitDayData>>>,
}

impl MonthCache {
    pub fn new(store: Arc<dyn CacheStore<Vec<TransitDayData>>>) -> Self {
        Self { store }
    }

    pub fn in_memory(policy: CachePolicy) -> Self {
        Self::new(Arc::new(MemoryCache::<Vec<TransitDayData>>::new(policy)))
    }

    pub fn on_disk(dir: PathBuf, policy: CachePolicy) -> Self {
        Self::new(Arc::new(DiskCache::<Vec<TransitDayData>>::new(
            dir.join("months"),
            policy,
        )))
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCache))
    }

    /// Store key for a subject month
    pub fn key(subject_id: &str, month: MonthKey) -> String {
        format!("{subject_id}:{month}")
    }

    pub async fn get(&self, subject_id: &str, month: MonthKey) -> Option<Vec<TransitDayData>> {
        let key = Self::key(subject_id, month);
        match self.store.get(&key).await {
            Ok(Some(days)) => {
                debug!(%key, days = days.len(), "month cache hit");
                Some(days)
            }
            Ok(None) => {
                debug!(%key, "month cache miss");
                None
            }
            Err(e) => {
                warn!(%key, error = %e, "month cache unavailable, treating as miss");
                None
            }
        }
    }

    /// Persist a complete month. Failures are logged, never raised.
    pub async fn set(&self, subject_id: &str, month: MonthKey, days: Vec<TransitDayData>) {
        let key = Self::key(subject_id, month);
        if let Err(e) = self.store.set(&key, days).await {
            warn!(%key, error = %e, "month cache write failed");
        }
    }

    pub async fn evict(&self, subject_id: &str, month: MonthKey) {
        let key = Self::key(subject_id, month);
        if let Err(e) = self.store.evict(&key).await {
            warn!(%key, error = %e, "month cache eviction failed");
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

// =============================================================================
// Ephemeris Cache
// =============================================================================

/// Complete ephemeris ranges, keyed by the date range itself.
#[derive(Clone)]
pub struct EphemerisCache {
    store: Arc<dyn CacheStore<Vec<EphemerisDay>>>,
}

impl EphemerisCache {
    pub fn new(store: Arc<dyn CacheStore<Vec<EphemerisDay>>>) -> Self {
        Self { store }
    }

    pub fn in_memory(policy: CachePolicy) -> Self {
        Self::new(Arc::new(MemoryCache::<Vec<EphemerisDay>>::new(policy)))
    }

    pub fn on_disk(dir: PathBuf, policy: CachePolicy) -> Self {
        Self::new(Arc::new(DiskCache::<Vec<EphemerisDay>>::new(
            dir.join("ephemeris"),
            policy,
        )))
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCache))
    }

    /// Store key for a range
    pub fn key(window: &DateWindow) -> String {
        format!("ephemeris:{}:{}", window.start(), window.end())
    }

    pub async fn get(&self, window: &DateWindow) -> Option<Vec<EphemerisDay>> {
        let key = Self::key(window);
        match self.store.get(&key).await {
            Ok(hit) => {
                debug!(%key, hit = hit.is_some(), "ephemeris cache lookup");
                hit
            }
            Err(e) => {
                warn!(%key, error = %e, "ephemeris cache unavailable, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, window: &DateWindow, days: Vec<EphemerisDay>) {
        let key = Self::key(window);
        if let Err(e) = self.store.set(&key, days).await {
            warn!(%key, error = %e, "ephemeris cache write failed");
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TransitError;
    use chrono::NaiveDate;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore<Vec<TransitDayData>> for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<TransitDayData>>> {
            Err(TransitError::cache("backend offline"))
        }

        async fn set(&self, _key: &str, _value: Vec<TransitDayData>) -> Result<()> {
            Err(TransitError::cache("backend offline"))
        }

        async fn evict(&self, _key: &str) -> Result<()> {
            Err(TransitError::cache("backend offline"))
        }

        async fn clear(&self) -> Result<()> {
            Err(TransitError::cache("backend offline"))
        }
    }

    #[test]
    fn test_month_key_format() {
        let month = MonthKey::new(2025, 1).unwrap();
        assert_eq!(MonthCache::key("natal-1", month), "natal-1:2025-01");
    }

    #[test]
    fn test_ephemeris_key_format() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(EphemerisCache::key(&window), "ephemeris:2025-01-01:2025-01-31");
    }

    #[test]
    fn test_policy_epoch_defaults_to_schema_version() {
        let policy = CachePolicy::default();
        assert_eq!(policy.epoch, CACHE_SCHEMA_VERSION);
        assert_eq!(policy.with_epoch(7).epoch, 7);
    }

    #[tokio::test]
    async fn test_unavailable_store_reads_as_miss() {
        let cache = MonthCache::new(Arc::new(BrokenStore));
        let month = MonthKey::new(2025, 1).unwrap();

        assert!(cache.get("natal-1", month).await.is_none());
        // Write failures are swallowed
        cache.set("natal-1", month, Vec::new()).await;
        cache.evict("natal-1", month).await;
        assert!(cache.clear().await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = MonthCache::disabled();
        let month = MonthKey::new(2025, 1).unwrap();
        cache.set("natal-1", month, Vec::new()).await;
        assert!(cache.get("natal-1", month).await.is_none());
    }

    #[tokio::test]
    async fn test_keys_are_case_sensitive() {
        let cache = MonthCache::in_memory(CachePolicy::default());
        let month = MonthKey::new(2025, 1).unwrap();
        cache.set("Natal-1", month, Vec::new()).await;

        assert!(cache.get("Natal-1", month).await.is_some());
        assert!(cache.get("natal-1", month).await.is_none());
    }
}
