//! Cache entry type

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::time::Timestamp;

/// Physical location of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// In-memory, lost when the process exits
    #[default]
    Transient,
    /// Survives restarts until evicted
    Persistent,
}

impl StorageKind {
    /// Get kind as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Transient => "transient",
            StorageKind::Persistent => "persistent",
        }
    }
}

/// A cached entry with its expiry metadata
///
/// Persisted as `{"data", "expiry", "createdAt", "storageBackend"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The cached payload
    pub data: T,
    /// When the entry was written
    pub created_at: Timestamp,
    /// Absolute expiration instant, `None` never expires
    pub expiry: Option<Timestamp>,
    /// Where the entry lives
    pub storage_backend: StorageKind,
}

impl<T> CacheEntry<T> {
    /// Create an entry that never expires
    pub fn new(data: T, created_at: Timestamp, storage_backend: StorageKind) -> Self {
        Self {
            data,
            created_at,
            expiry: None,
            storage_backend,
        }
    }

    /// Create an entry expiring `ttl` after `created_at`
    ///
    /// A zero TTL means the entry never expires.
    pub fn with_ttl(
        data: T,
        created_at: Timestamp,
        ttl: Option<Duration>,
        storage_backend: StorageKind,
    ) -> Self {
        let mut entry = Self::new(data, created_at, storage_backend);
        entry.expiry = ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| created_at + ttl);
        entry
    }

    /// Check if entry has expired at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expiry, Some(expiry) if expiry <= now)
    }

    /// Get remaining TTL, `None` if the entry never expires
    pub fn ttl_remaining(&self, now: Timestamp) -> Option<Duration> {
        self.expiry.map(|expiry| expiry.saturating_since(now))
    }

    /// Get age of the entry
    pub fn age(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.created_at)
    }

    /// Map the payload, keeping the metadata
    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            data: f(self.data),
            created_at: self.created_at,
            expiry: self.expiry,
            storage_backend: self.storage_backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = CacheEntry::new("test", at(0), StorageKind::Transient);
        assert!(!entry.is_expired(at(u64::MAX)));
        assert!(entry.ttl_remaining(at(10)).is_none());
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let entry = CacheEntry::with_ttl(1, at(0), Some(Duration::ZERO), StorageKind::Transient);
        assert!(entry.expiry.is_none());
    }

    #[test]
    fn test_entry_with_ttl() {
        let entry = CacheEntry::with_ttl(
            "test",
            at(1_000),
            Some(Duration::from_millis(1_000)),
            StorageKind::Transient,
        );
        assert!(!entry.is_expired(at(1_999)));
        assert!(entry.is_expired(at(2_000)));
        assert_eq!(entry.ttl_remaining(at(1_250)), Some(Duration::from_millis(750)));
        assert_eq!(entry.age(at(1_250)), Duration::from_millis(250));
    }

    #[test]
    fn test_persisted_layout() {
        let entry = CacheEntry::with_ttl(
            serde_json::json!({"home": 3}),
            at(10),
            Some(Duration::from_millis(5)),
            StorageKind::Persistent,
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {"home": 3},
                "createdAt": 10,
                "expiry": 15,
                "storageBackend": "persistent"
            })
        );
    }

    #[test]
    fn test_map_keeps_metadata() {
        let entry = CacheEntry::with_ttl(21, at(0), Some(Duration::from_secs(1)), StorageKind::Transient);
        let mapped = entry.map(|v| v * 2);
        assert_eq!(mapped.data, 42);
        assert_eq!(mapped.expiry, Some(at(1_000)));
    }
}
