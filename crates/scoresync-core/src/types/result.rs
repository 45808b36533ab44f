//! Cache lookup result type

use super::entry::CacheEntry;

/// Result of a cache lookup operation
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Fresh cache hit
    Hit(CacheEntry<T>),
    /// Expired but still present
    Stale(CacheEntry<T>),
    /// Cache miss
    Miss,
}

impl<T> CacheResult<T> {
    /// Check if this is a fresh hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }

    /// Check if this is a miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheResult::Miss)
    }

    /// Check if stale (needs revalidation)
    pub fn is_stale(&self) -> bool {
        matches!(self, CacheResult::Stale(_))
    }

    /// Extract the payload, consuming the result
    pub fn data(self) -> Option<T> {
        self.entry().map(|entry| entry.data)
    }

    /// Extract the full entry, consuming the result
    pub fn entry(self) -> Option<CacheEntry<T>> {
        match self {
            CacheResult::Hit(entry) | CacheResult::Stale(entry) => Some(entry),
            CacheResult::Miss => None,
        }
    }

    /// Map the payload if present
    pub fn map<U, F>(self, f: F) -> CacheResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CacheResult::Hit(entry) => CacheResult::Hit(entry.map(f)),
            CacheResult::Stale(entry) => CacheResult::Stale(entry.map(f)),
            CacheResult::Miss => CacheResult::Miss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StorageKind, Timestamp};

    fn entry(v: i32) -> CacheEntry<i32> {
        CacheEntry::new(v, Timestamp::from_millis(0), StorageKind::Transient)
    }

    #[test]
    fn test_hit() {
        let result = CacheResult::Hit(entry(42));
        assert!(result.is_hit());
        assert!(!result.is_miss());
        assert!(!result.is_stale());
    }

    #[test]
    fn test_miss() {
        let result: CacheResult<i32> = CacheResult::Miss;
        assert!(result.is_miss());
        assert!(result.data().is_none());
    }

    #[test]
    fn test_stale_still_yields_data() {
        let result = CacheResult::Stale(entry(7));
        assert!(result.is_stale());
        assert_eq!(result.data(), Some(7));
    }

    #[test]
    fn test_map() {
        let mapped = CacheResult::Hit(entry(42)).map(|v| v * 2);
        assert_eq!(mapped.data(), Some(84));
    }
}
