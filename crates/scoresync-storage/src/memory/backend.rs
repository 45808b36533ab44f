//! In-memory cache backend using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use scoresync_core::{CacheBackend, CacheEntry, CacheStats, Result, StorageKind, Timestamp};

/// Configuration for the memory backend
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of entries (0 = unlimited)
    pub max_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self { max_capacity: 0 }
    }
}

/// Internal statistics tracking
#[derive(Debug, Default)]
struct MemoryStats {
    writes: u64,
    deletes: u64,
    evictions: u64,
    expired: u64,
}

/// Transient in-memory backend
///
/// Uses `DashMap` for concurrent reads. Writes are serialized together with
/// an age index, so the capacity limit holds under concurrent writers and
/// the oldest entry is found without scanning.
/// Cloning creates a new handle to the SAME underlying store.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<DashMap<String, CacheEntry<Value>>>,
    /// `(created_at, key)` of every entry; mutated only with `data`
    by_age: Arc<Mutex<BTreeSet<(Timestamp, String)>>>,
    stats: Arc<RwLock<MemoryStats>>,
    config: MemoryConfig,
}

impl MemoryBackend {
    /// Create a new memory backend
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.max_capacity.min(10_000))),
            by_age: Arc::new(Mutex::new(BTreeSet::new())),
            stats: Arc::new(RwLock::new(MemoryStats::default())),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Evict the oldest entries until one more fits
    fn make_room(&self, by_age: &mut BTreeSet<(Timestamp, String)>) -> usize {
        if self.config.max_capacity == 0 {
            return 0;
        }

        let mut evicted = 0;
        while self.data.len() >= self.config.max_capacity {
            let Some((_, victim)) = by_age.pop_first() else {
                break;
            };
            if self.data.remove(&victim).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.stats.write().evictions += evicted as u64;
        }
        evicted
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Transient
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>> {
        Ok(self.data.get(key).map(|entry| entry.clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry<Value>) -> Result<usize> {
        let entry = CacheEntry {
            storage_backend: StorageKind::Transient,
            ..entry
        };
        let created_at = entry.created_at;

        let mut by_age = self.by_age.lock();
        let evicted = if self.data.contains_key(key) {
            0
        } else {
            self.make_room(&mut by_age)
        };
        if let Some(previous) = self.data.insert(key.to_string(), entry) {
            by_age.remove(&(previous.created_at, key.to_string()));
        }
        by_age.insert((created_at, key.to_string()));
        drop(by_age);

        self.stats.write().writes += 1;
        Ok(evicted)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut by_age = self.by_age.lock();
        match self.data.remove(key) {
            Some((key, entry)) => {
                by_age.remove(&(entry.created_at, key));
                drop(by_age);
                self.stats.write().deletes += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        let mut by_age = self.by_age.lock();
        let mut removed = 0usize;
        self.data.retain(|key, entry| {
            if entry.is_expired(now) {
                by_age.remove(&(entry.created_at, key.clone()));
                removed += 1;
                false
            } else {
                true
            }
        });
        drop(by_age);

        if removed > 0 {
            self.stats.write().expired += removed as u64;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let mut by_age = self.by_age.lock();
        self.data.clear();
        by_age.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let stats = self.stats.read();
        Ok(CacheStats {
            writes: stats.writes,
            deletes: stats.deletes,
            evictions: stats.evictions,
            expired: stats.expired,
            size: self.data.len(),
            ..Default::default()
        })
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn entry(data: Value, created_ms: u64, ttl: Option<Duration>) -> CacheEntry<Value> {
        CacheEntry::with_ttl(
            data,
            Timestamp::from_millis(created_ms),
            ttl,
            StorageKind::Transient,
        )
    }

    #[tokio::test]
    async fn test_basic_get_set() {
        let backend = MemoryBackend::with_defaults();

        backend
            .set("key1", entry(json!("value1"), 0, Some(Duration::from_secs(60))))
            .await
            .unwrap();

        let result = backend.get("key1").await.unwrap();
        assert_eq!(result.unwrap().data, json!("value1"));
    }

    #[tokio::test]
    async fn test_get_returns_expired_entries() {
        let backend = MemoryBackend::with_defaults();
        backend
            .set("key1", entry(json!(1), 0, Some(Duration::from_millis(10))))
            .await
            .unwrap();

        let result = backend.get("key1").await.unwrap().unwrap();
        assert!(result.is_expired(Timestamp::from_millis(100)));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::with_defaults();
        backend.set("key1", entry(json!(1), 0, None)).await.unwrap();
        assert!(backend.exists("key1").await.unwrap());

        assert!(backend.delete("key1").await.unwrap());
        assert!(!backend.delete("key1").await.unwrap());
        assert!(!backend.exists("key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryBackend::with_defaults();
        backend
            .set("short", entry(json!(1), 0, Some(Duration::from_millis(10))))
            .await
            .unwrap();
        backend
            .set("long", entry(json!(2), 0, Some(Duration::from_secs(60))))
            .await
            .unwrap();
        backend.set("forever", entry(json!(3), 0, None)).await.unwrap();

        let removed = backend
            .purge_expired(Timestamp::from_millis(1_000))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.len().await.unwrap(), 2);

        // Idempotent
        let removed = backend
            .purge_expired(Timestamp::from_millis(1_000))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(backend.stats().await.unwrap().expired, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let backend = MemoryBackend::new(MemoryConfig::with_capacity(2));

        backend.set("key1", entry(json!(1), 10, None)).await.unwrap();
        backend.set("key2", entry(json!(2), 20, None)).await.unwrap();
        backend.set("key3", entry(json!(3), 30, None)).await.unwrap();

        assert_eq!(backend.len().await.unwrap(), 2);
        assert!(!backend.exists("key1").await.unwrap());
        assert_eq!(backend.stats().await.unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn test_set_reports_evictions() {
        let backend = MemoryBackend::new(MemoryConfig::with_capacity(1));

        assert_eq!(backend.set("key1", entry(json!(1), 10, None)).await.unwrap(), 0);
        assert_eq!(backend.set("key2", entry(json!(2), 5, None)).await.unwrap(), 1);
        // The newcomer stays even when it is the oldest
        assert!(backend.exists("key2").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_holds_under_concurrent_writers() {
        let backend = MemoryBackend::new(MemoryConfig::with_capacity(8));

        let mut handles = Vec::new();
        for writer in 0..4u64 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50u64 {
                    let key = format!("w{writer}:{i}");
                    backend.set(&key, entry(json!(i), writer * 100 + i, None)).await.unwrap();
                    assert!(backend.len().await.unwrap() <= 8);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(backend.len().await.unwrap(), 8);
        assert_eq!(backend.stats().await.unwrap().evictions, 192);
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let backend = MemoryBackend::new(MemoryConfig::with_capacity(2));

        backend.set("key1", entry(json!(1), 10, None)).await.unwrap();
        backend.set("key2", entry(json!(2), 20, None)).await.unwrap();
        backend.set("key1", entry(json!(9), 30, None)).await.unwrap();

        assert_eq!(backend.len().await.unwrap(), 2);
        assert_eq!(backend.get("key1").await.unwrap().unwrap().data, json!(9));
    }

    #[tokio::test]
    async fn test_clear() {
        let backend = MemoryBackend::with_defaults();
        backend.set("key1", entry(json!(1), 0, None)).await.unwrap();
        backend.set("key2", entry(json!(2), 0, None)).await.unwrap();

        backend.clear().await.unwrap();
        assert!(backend.is_empty().await.unwrap());
    }
}
