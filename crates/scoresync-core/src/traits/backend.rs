//! Storage backend trait

use async_trait::async_trait;
use serde_json::Value;

use crate::{CacheEntry, CacheStats, Result, StorageKind, Timestamp};

/// Core trait for all cache storage backends
///
/// Backends store entries as plain JSON trees and never judge expiry on
/// reads; the tiered store decides whether an expired entry is served,
/// purged or treated as stale. Implementations include the in-memory
/// transient backend and the file-based persistent backend.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Which storage tier this backend implements
    fn kind(&self) -> StorageKind;

    /// Get an entry, expired or not
    ///
    /// Returns `None` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>>;

    /// Store an entry, replacing any previous one
    ///
    /// Returns how many other entries were evicted to make room.
    async fn set(&self, key: &str, entry: CacheEntry<Value>) -> Result<usize>;

    /// Delete a key
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All keys currently stored
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove every entry whose expiry is at or before `now`
    ///
    /// Returns the number of entries removed.
    async fn purge_expired(&self, now: Timestamp) -> Result<usize>;

    /// Clear all entries
    async fn clear(&self) -> Result<()>;

    /// Get backend statistics
    async fn stats(&self) -> Result<CacheStats>;

    /// Get the number of entries
    async fn len(&self) -> Result<usize>;

    /// Check if a key exists, expired or not
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Check if the backend is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
