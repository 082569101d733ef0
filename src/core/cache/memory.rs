//! Bounded in-process store.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{CachePolicy, CacheStore};
use crate::core::error::{Result, TransitError};

/// Insertion-ordered map with oldest-first eviction and TTL on read.
pub struct MemoryCache<V> {
    entries: Mutex<IndexMap<String, MemoryEntry<V>>>,
    policy: CachePolicy,
    epoch: AtomicU32,
    _marker: PhantomData<fn() -> V>,
}

struct MemoryEntry<V> {
    value: V,
    stored_at: Instant,
    epoch: u32,
}

impl<V> MemoryCache<V> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            epoch: AtomicU32::new(policy.epoch),
            policy,
            _marker: PhantomData,
        }
    }

    /// Invalidate every entry written so far.
    pub fn bump_epoch(&self) -> u32 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of entries currently held (live or not yet pruned)
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IndexMap<String, MemoryEntry<V>>>> {
        self.entries
            .lock()
            .map_err(|_| TransitError::cache("memory cache poisoned"))
    }
}

#[async_trait]
impl<V> CacheStore<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut entries = self.lock()?;
        let live = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.epoch == epoch && entry.stored_at.elapsed() <= self.policy.ttl,
        };
        if !live {
            entries.shift_remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: V) -> Result<()> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut entries = self.lock()?;
        // Re-inserting moves the key to the back of the eviction order
        entries.shift_remove(key);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                stored_at: Instant::now(),
                epoch,
            },
        );
        while entries.len() > self.policy.max_entries {
            entries.shift_remove_index(0);
        }
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<()> {
        self.lock()?.shift_remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(max_entries: usize) -> CachePolicy {
        CachePolicy::new(max_entries, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::<Vec<u32>>::new(policy(4));
        cache.set("a:2025-01", vec![1, 2, 3]).await.unwrap();
        assert_eq!(cache.get("a:2025-01").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("a:2025-02").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rewrite_is_idempotent() {
        let cache = MemoryCache::<Vec<u32>>::new(policy(4));
        cache.set("k", vec![7]).await.unwrap();
        cache.set("k", vec![7]).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![7]));
    }

    #[tokio::test]
    async fn test_oldest_entry_evicted_past_limit() {
        let cache = MemoryCache::<u32>::new(policy(2));
        cache.set("first", 1).await.unwrap();
        cache.set("second", 2).await.unwrap();
        cache.set("third", 3).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("first").await.unwrap(), None);
        assert_eq!(cache.get("third").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_rewrite_refreshes_eviction_order() {
        let cache = MemoryCache::<u32>::new(policy(2));
        cache.set("first", 1).await.unwrap();
        cache.set("second", 2).await.unwrap();
        cache.set("first", 10).await.unwrap();
        cache.set("third", 3).await.unwrap();

        assert_eq!(cache.get("second").await.unwrap(), None);
        assert_eq!(cache.get("first").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_expired_entries_read_as_miss() {
        let cache = MemoryCache::<u32>::new(CachePolicy::new(4, Duration::ZERO));
        cache.set("k", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_epoch_bump_invalidates_everything() {
        let cache = MemoryCache::<u32>::new(policy(4));
        cache.set("a", 1).await.unwrap();
        cache.set("b", 2).await.unwrap();

        assert_eq!(cache.bump_epoch(), 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), None);

        cache.set("a", 3).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_evict_and_clear() {
        let cache = MemoryCache::<u32>::new(policy(4));
        cache.set("a", 1).await.unwrap();
        cache.set("b", 2).await.unwrap();

        cache.evict("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_zero_capacity_holds_nothing() {
        let cache = MemoryCache::<u32>::new(policy(0));
        cache.set("a", 1).await.unwrap();
        assert!(cache.is_empty());
    }
}
