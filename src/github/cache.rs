//! Tiered response cache.
//!
//! The local tier lives in process memory. The shared tier outlives the
//! process (JSON files on disk) so consecutive runs and parallel jobs can reuse
//! responses and their ETags. GitHub itself is the last tier and is handled by
//! the collections layer.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub etag: Option<String>,
    pub fetched: DateTime<Utc>,
    /// Next page link returned alongside this page.
    pub next: Option<String>,
    pub body: serde_json::Value,
}

impl CachedEntry {
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched < max_age
    }
}

#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>>;
    async fn set(&self, key: &str, entry: &CachedEntry) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CachedEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &str, entry: &CachedEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key, named by the key's SHA-256.
#[derive(Debug)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.directory.join(format!("{}.json", hex::encode(digest)))
    }
}

#[async_trait]
impl CacheProvider for FileCache {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>> {
        let path = self.path_for(key);
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // A torn or foreign file is a miss, not a failure.
                debug!(path = %path.display(), error = %e, "discarding unreadable cache file");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: &CachedEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(entry)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Local,
    Shared,
}

pub struct TieredCache {
    local: MemoryCache,
    shared: Option<Arc<dyn CacheProvider>>,
}

impl TieredCache {
    pub fn new(shared: Option<Arc<dyn CacheProvider>>) -> Self {
        Self {
            local: MemoryCache::new(),
            shared,
        }
    }

    pub fn local_only() -> Self {
        Self::new(None)
    }

    /// Finds `key` in the nearest tier. Shared hits are copied into the local tier.
    pub async fn lookup(&self, key: &str) -> Result<Option<(CachedEntry, CacheTier)>> {
        if let Some(entry) = self.local.get(key).await? {
            return Ok(Some((entry, CacheTier::Local)));
        }
        let Some(shared) = &self.shared else {
            return Ok(None);
        };
        match shared.get(key).await? {
            Some(entry) => {
                self.local.set(key, &entry).await?;
                Ok(Some((entry, CacheTier::Shared)))
            }
            None => Ok(None),
        }
    }

    pub async fn store(&self, key: &str, entry: &CachedEntry) -> Result<()> {
        self.local.set(key, entry).await?;
        if let Some(shared) = &self.shared {
            shared.set(key, entry).await?;
        }
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.local.delete(key).await?;
        if let Some(shared) = &self.shared {
            shared.delete(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: serde_json::Value) -> CachedEntry {
        CachedEntry {
            etag: Some("\"abc\"".to_string()),
            fetched: Utc::now(),
            next: None,
            body,
        }
    }

    #[test]
    fn freshness_uses_max_age() {
        let mut e = entry(serde_json::json!(1));
        let now = Utc::now();
        assert!(e.is_fresh(Duration::seconds(60), now));
        e.fetched = now - Duration::seconds(61);
        assert!(!e.is_fresh(Duration::seconds(60), now));
    }

    #[tokio::test]
    async fn file_cache_persists_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = FileCache::new(dir.path().join("cache"));
        assert!(cache.get("rest:/orgs/contoso").await?.is_none());

        cache
            .set("rest:/orgs/contoso", &entry(serde_json::json!({"login": "contoso"})))
            .await?;
        let loaded = cache.get("rest:/orgs/contoso").await?.unwrap();
        assert_eq!(loaded.body["login"], "contoso");
        assert_eq!(loaded.etag.as_deref(), Some("\"abc\""));

        cache.delete("rest:/orgs/contoso").await?;
        cache.delete("rest:/orgs/contoso").await?;
        assert!(cache.get("rest:/orgs/contoso").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_a_miss() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = FileCache::new(dir.path().to_path_buf());
        std::fs::write(cache.path_for("k"), b"{not json")?;
        assert!(cache.get("k").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn shared_hit_is_promoted_to_local() -> anyhow::Result<()> {
        let shared = Arc::new(MemoryCache::new());
        shared.set("k", &entry(serde_json::json!([1, 2]))).await?;
        let tiered = TieredCache::new(Some(shared.clone()));

        let (_, tier) = tiered.lookup("k").await?.unwrap();
        assert_eq!(tier, CacheTier::Shared);
        let (_, tier) = tiered.lookup("k").await?.unwrap();
        assert_eq!(tier, CacheTier::Local);

        tiered.remove("k").await?;
        assert!(tiered.lookup("k").await?.is_none());
        assert_eq!(shared.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn store_writes_every_tier() -> anyhow::Result<()> {
        let shared = Arc::new(MemoryCache::new());
        let tiered = TieredCache::new(Some(shared.clone()));
        tiered.store("k", &entry(serde_json::json!("v"))).await?;
        assert!(shared.get("k").await?.is_some());

        let local_only = TieredCache::local_only();
        local_only.store("k", &entry(serde_json::json!("v"))).await?;
        assert!(local_only.lookup("k").await?.is_some());
        Ok(())
    }
}
