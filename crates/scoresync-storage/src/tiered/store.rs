use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use scoresync_core::{
    CacheBackend, CacheEntry, CacheOptions, CacheResult, CacheStats, Clock, EvictionReason,
    NoopMetrics, Result, StorageKind, SyncError, SyncMetrics, SystemClock,
};

use crate::file::{FileBackend, FileConfig};
use crate::memory::{MemoryBackend, MemoryConfig};

/// Configuration for the tiered store
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Transient tier settings
    pub memory: MemoryConfig,
    /// Persistent tier settings, `None` keeps everything in memory
    pub persistent: Option<FileConfig>,
}

impl StoreConfig {
    /// Memory-only configuration
    pub fn transient_only() -> Self {
        Self::default()
    }

    /// Add a persistent tier
    pub fn with_persistent(mut self, config: FileConfig) -> Self {
        self.persistent = Some(config);
        self
    }
}

#[derive(Debug, Default)]
struct LookupStats {
    hits: u64,
    misses: u64,
    stale_hits: u64,
    fallbacks: u64,
}

/// Key/value store spanning a transient and an optional persistent tier
///
/// Every entry lives in exactly one tier, chosen per write. Reads consult
/// the transient tier first. Faults in either tier are logged and absorbed:
/// failed persistent writes land in the transient tier, unreadable
/// persistent entries are purged and reported as misses.
///
/// Cloning creates a new handle to the SAME underlying tiers.
#[derive(Clone)]
pub struct TieredStore {
    transient: Arc<dyn CacheBackend>,
    persistent: Option<Arc<dyn CacheBackend>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn SyncMetrics>,
    stats: Arc<RwLock<LookupStats>>,
}

impl TieredStore {
    /// Create a store over a transient backend
    pub fn new(transient: impl CacheBackend) -> Self {
        Self {
            transient: Arc::new(transient),
            persistent: None,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoopMetrics),
            stats: Arc::new(RwLock::new(LookupStats::default())),
        }
    }

    /// Build both tiers from configuration
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let store = Self::new(MemoryBackend::new(config.memory.clone()));
        match &config.persistent {
            Some(file) => Ok(store.with_persistent(FileBackend::new(file.clone()).await?)),
            None => Ok(store),
        }
    }

    /// In-memory store with default settings
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::with_defaults())
    }

    /// Attach a persistent tier
    pub fn with_persistent(mut self, backend: impl CacheBackend) -> Self {
        self.persistent = Some(Arc::new(backend));
        self
    }

    /// Use a custom clock
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Use a shared clock
    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<dyn SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The clock this store judges expiry with
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Serialize and store a value
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        options: &CacheOptions,
    ) -> Result<StorageKind> {
        let value =
            serde_json::to_value(data).map_err(|e| SyncError::Serialization(e.to_string()))?;
        Ok(self.set_value(key, value, options).await)
    }

    /// Store a JSON value, returning the tier it landed in
    ///
    /// Never fails: a persistent write that errors falls back to the
    /// transient tier. Each write is followed by an expiry sweep.
    pub async fn set_value(&self, key: &str, data: Value, options: &CacheOptions) -> StorageKind {
        let entry = CacheEntry::with_ttl(data, self.clock.now(), options.ttl, options.backend);

        let written = match (options.backend, &self.persistent) {
            (StorageKind::Persistent, Some(persistent)) => {
                match persistent.set(key, entry.clone()).await {
                    Ok(evicted) => {
                        self.record_capacity_evictions(evicted);
                        StorageKind::Persistent
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "persistent write failed, using transient storage");
                        self.write_transient(key, entry).await
                    }
                }
            }
            (StorageKind::Persistent, None) => {
                debug!(key = %key, "no persistent backend configured, using transient storage");
                self.write_transient(key, entry).await
            }
            (StorageKind::Transient, _) => self.write_transient(key, entry).await,
        };

        // Drop any copy in the other tier so it can't shadow this write
        let other = match written {
            StorageKind::Transient => self.persistent.as_ref(),
            StorageKind::Persistent => Some(&self.transient),
        };
        if let Some(other) = other {
            if let Err(e) = other.delete(key).await {
                warn!(key = %key, error = %e, "failed to drop superseded entry");
            }
        }

        self.cleanup().await;
        written
    }

    async fn write_transient(&self, key: &str, entry: CacheEntry<Value>) -> StorageKind {
        if entry.storage_backend == StorageKind::Persistent {
            self.stats.write().fallbacks += 1;
            self.metrics.record_fallback(key);
        }
        match self.transient.set(key, entry).await {
            Ok(evicted) => self.record_capacity_evictions(evicted),
            Err(e) => warn!(key = %key, error = %e, "transient write failed"),
        }
        StorageKind::Transient
    }

    fn record_capacity_evictions(&self, evicted: usize) {
        if evicted > 0 {
            debug!(evicted, "evicted oldest entries to make room");
        }
        for _ in 0..evicted {
            self.metrics.record_eviction(EvictionReason::Capacity);
        }
    }

    /// Raw entry for `key`, expired or not
    ///
    /// Unreadable persistent entries are purged and reported as absent.
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        match self.transient.get(key).await {
            Ok(Some(entry)) => return Some(entry),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "transient read failed"),
        }

        let persistent = self.persistent.as_ref()?;
        match persistent.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable persisted entry");
                let _ = persistent.delete(key).await;
                self.metrics.record_eviction(EvictionReason::Corrupt);
                None
            }
        }
    }

    /// Classify the entry for `key` as fresh, stale or missing
    pub async fn lookup(&self, key: &str) -> CacheResult<Value> {
        match self.get_entry(key).await {
            Some(entry) if entry.is_expired(self.clock.now()) => {
                self.stats.write().stale_hits += 1;
                self.metrics.record_stale_hit(key);
                CacheResult::Stale(entry)
            }
            Some(entry) => {
                self.stats.write().hits += 1;
                self.metrics.record_hit(key, entry.storage_backend);
                CacheResult::Hit(entry)
            }
            None => {
                self.stats.write().misses += 1;
                self.metrics.record_miss(key);
                CacheResult::Miss
            }
        }
    }

    /// Read and decode the value for `key`
    ///
    /// With `check_expiry` an expired entry is purged and `None` returned;
    /// without it expired data is still handed out. A payload that no
    /// longer decodes as `T` is purged and treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, check_expiry: bool) -> Option<T> {
        let entry = self.get_entry(key).await?;

        if check_expiry && entry.is_expired(self.clock.now()) {
            self.remove(key).await;
            self.metrics.record_eviction(EvictionReason::Expired);
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(key = %key, error = %e, "cached payload has unexpected shape, purging");
                self.remove(key).await;
                self.metrics.record_eviction(EvictionReason::Corrupt);
                None
            }
        }
    }

    /// Purge `key` from every tier
    ///
    /// Returns `true` if any tier held it.
    pub async fn remove(&self, key: &str) -> bool {
        let mut removed = false;
        for backend in self.backends() {
            match backend.delete(key).await {
                Ok(deleted) => removed |= deleted,
                Err(e) => warn!(key = %key, tier = backend.kind().as_str(), error = %e, "delete failed"),
            }
        }
        removed
    }

    /// Sweep every tier for expired entries
    ///
    /// Returns the number removed. Idempotent and safe to call after every write.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for backend in self.backends() {
            match backend.purge_expired(now).await {
                Ok(count) => removed += count,
                Err(e) => warn!(tier = backend.kind().as_str(), error = %e, "cleanup failed"),
            }
        }
        for _ in 0..removed {
            self.metrics.record_eviction(EvictionReason::Expired);
        }
        removed
    }

    /// Clear every tier
    pub async fn clear(&self) -> Result<()> {
        for backend in self.backends() {
            backend.clear().await?;
        }
        Ok(())
    }

    /// Combined statistics of every tier
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut merged = CacheStats::default();
        for backend in self.backends() {
            merged.merge(&backend.stats().await?);
        }
        let lookups = self.stats.read();
        merged.hits += lookups.hits;
        merged.misses += lookups.misses;
        merged.stale_hits += lookups.stale_hits;
        merged.fallbacks += lookups.fallbacks;
        Ok(merged)
    }

    /// Number of entries across tiers
    pub async fn len(&self) -> Result<usize> {
        let mut total = 0;
        for backend in self.backends() {
            total += backend.len().await?;
        }
        Ok(total)
    }

    /// Check if every tier is empty
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    fn backends(&self) -> impl Iterator<Item = &Arc<dyn CacheBackend>> {
        std::iter::once(&self.transient).chain(self.persistent.iter())
    }
}
