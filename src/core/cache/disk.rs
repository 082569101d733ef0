//! Persistent on-disk store
//!
//! One bincode file per key. Invalidation uses a triple-check:
//! - Schema epoch (format changes)
//! - Stored key (guards against hash collisions)
//! - Entry TTL (policy max age)
//!
//! Writes go to a temp file first and are renamed into place, so a reader
//! sees either the old entry, the new one, or nothing.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::{CachePolicy, CacheStore};
use crate::core::error::Result;

/// Cache entry file extension
const ENTRY_EXTENSION: &str = "bin";

/// Temp file extension for in-progress writes
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Deserialize)]
struct StoredEntry<V> {
    version: u32,
    key: String,
    created_at: u64,
    value: V,
}

#[derive(Serialize)]
struct StoredEntryRef<'a, V> {
    version: u32,
    key: &'a str,
    created_at: u64,
    value: &'a V,
}

/// Directory-backed store
pub struct DiskCache<V> {
    dir: PathBuf,
    policy: CachePolicy,
    _marker: PhantomData<fn() -> V>,
}

impl<V> DiskCache<V> {
    pub fn new(dir: PathBuf, policy: CachePolicy) -> Self {
        Self {
            dir,
            policy,
            _marker: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir
            .join(format!("{:x}.{}", hasher.finalize(), ENTRY_EXTENSION))
    }

    async fn remove_quietly(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the oldest entry files beyond `max_entries`.
    async fn prune(&self) -> Result<()> {
        let mut files = Vec::new();
        let mut reader = fs::read_dir(&self.dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(UNIX_EPOCH);
            files.push((modified, path));
        }
        if files.len() <= self.policy.max_entries {
            return Ok(());
        }
        files.sort();
        let excess = files.len() - self.policy.max_entries;
        for (_, path) in files.into_iter().take(excess) {
            debug!(path = %path.display(), "pruning cache entry");
            Self::remove_quietly(&path).await?;
        }
        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl<V> CacheStore<V> for DiskCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        let path = self.entry_path(key);
        let buffer = match fs::read(&path).await {
            Ok(buffer) => buffer,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: StoredEntry<V> = match bincode::deserialize(&buffer) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(%key, error = %e, "dropping undecodable cache entry");
                Self::remove_quietly(&path).await?;
                return Ok(None);
            }
        };

        if entry.version != self.policy.epoch {
            debug!(%key, version = entry.version, "dropping cache entry from another epoch");
            Self::remove_quietly(&path).await?;
            return Ok(None);
        }

        if entry.key != key {
            return Ok(None);
        }

        if now_secs().saturating_sub(entry.created_at) > self.policy.ttl.as_secs() {
            debug!(%key, "dropping expired cache entry");
            Self::remove_quietly(&path).await?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: V) -> Result<()> {
        if self.policy.max_entries == 0 {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).await?;

        let buffer = bincode::serialize(&StoredEntryRef {
            version: self.policy.epoch,
            key,
            created_at: now_secs(),
            value: &value,
        })?;

        // Write atomically (write to temp, then rename)
        let path = self.entry_path(key);
        let temp_path = path.with_extension(format!(
            "{}.{}.{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ));
        fs::write(&temp_path, &buffer).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            Self::remove_quietly(&temp_path).await?;
            return Err(e.into());
        }

        self.prune().await
    }

    async fn evict(&self, key: &str) -> Result<()> {
        Self::remove_quietly(&self.entry_path(key)).await
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
