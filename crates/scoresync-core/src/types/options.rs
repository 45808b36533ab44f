//! Cache options, builder and per-class policies
//!
//! Recognized options:
//!
//! | Option | Default | Meaning |
//! |---|---|---|
//! | `ttl` | 5 min | `None` or zero never expires |
//! | `backend` | transient | where the entry is written |
//! | `stale_while_revalidate` | `true` | serve expired data while refreshing |
//! | `deduplicate` | `true` | share in-flight fetches per key |
//!
//! The persisted key prefix is a property of the file backend, see
//! `FileConfig::key_prefix` in `scoresync-storage`.

use std::time::Duration;

use super::entry::StorageKind;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Per-call cache policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Time-to-live, `None` or zero means the entry never expires
    pub ttl: Option<Duration>,
    /// Backend the entry is written to
    pub backend: StorageKind,
    /// Serve expired data while refreshing in the background
    pub stale_while_revalidate: bool,
    /// Share one in-flight fetch between concurrent callers
    pub deduplicate: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_TTL),
            backend: StorageKind::Transient,
            stale_while_revalidate: true,
            deduplicate: true,
        }
    }
}

/// Builder for CacheOptions with fluent API
#[derive(Debug, Clone, Default)]
pub struct CacheOpts(CacheOptions);

impl CacheOpts {
    /// Create new options builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the policy of a data class
    pub fn class(class: DataClass) -> Self {
        Self(class.options())
    }

    /// Set TTL
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.0.ttl = Some(duration);
        self
    }

    /// Set TTL in milliseconds
    pub fn ttl_millis(self, millis: u64) -> Self {
        self.ttl(Duration::from_millis(millis))
    }

    /// Set TTL in seconds
    pub fn ttl_secs(self, seconds: u64) -> Self {
        self.ttl(Duration::from_secs(seconds))
    }

    /// Set TTL in minutes
    pub fn ttl_mins(self, minutes: u64) -> Self {
        self.ttl(Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// Never expire automatically
    pub fn no_expiry(mut self) -> Self {
        self.0.ttl = None;
        self
    }

    /// Choose the backend
    pub fn backend(mut self, backend: StorageKind) -> Self {
        self.0.backend = backend;
        self
    }

    /// Write to the persistent backend
    pub fn persistent(self) -> Self {
        self.backend(StorageKind::Persistent)
    }

    /// Enable or disable stale-while-revalidate
    pub fn swr(mut self, enabled: bool) -> Self {
        self.0.stale_while_revalidate = enabled;
        self
    }

    /// Enable or disable request deduplication
    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.0.deduplicate = enabled;
        self
    }

    /// Build the options
    pub fn build(self) -> CacheOptions {
        self.0
    }
}

impl From<CacheOpts> for CacheOptions {
    fn from(opts: CacheOpts) -> Self {
        opts.0
    }
}

impl From<Duration> for CacheOptions {
    fn from(ttl: Duration) -> Self {
        CacheOptions {
            ttl: Some(ttl),
            ..Default::default()
        }
    }
}

impl From<DataClass> for CacheOptions {
    fn from(class: DataClass) -> Self {
        class.options()
    }
}

/// Class of data, each with its own expiry and storage policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataClass {
    /// Live game and event data
    Live,
    /// Slow-changing entity metadata such as team info
    Metadata,
    /// Static reference data
    Static,
    /// Auxiliary environmental data such as weather
    Environmental,
}

impl DataClass {
    /// Time-to-live for this class
    pub fn ttl(&self) -> Duration {
        match self {
            DataClass::Live => Duration::from_secs(30),
            DataClass::Metadata => Duration::from_secs(24 * 60 * 60),
            DataClass::Static => Duration::from_secs(7 * 24 * 60 * 60),
            DataClass::Environmental => Duration::from_secs(30 * 60),
        }
    }

    /// Backend this class is stored in
    pub fn backend(&self) -> StorageKind {
        match self {
            DataClass::Live => StorageKind::Transient,
            DataClass::Metadata | DataClass::Static | DataClass::Environmental => {
                StorageKind::Persistent
            }
        }
    }

    /// Full options for this class
    pub fn options(&self) -> CacheOptions {
        CacheOptions {
            ttl: Some(self.ttl()),
            backend: self.backend(),
            ..Default::default()
        }
    }

    /// Get class as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClass::Live => "live",
            DataClass::Metadata => "metadata",
            DataClass::Static => "static",
            DataClass::Environmental => "environmental",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let opts = CacheOpts::new().build();
        assert_eq!(opts.ttl, Some(DEFAULT_TTL));
        assert_eq!(opts.backend, StorageKind::Transient);
        assert!(opts.stale_while_revalidate);
        assert!(opts.deduplicate);
    }

    #[test]
    fn test_builder_fluent() {
        let opts = CacheOpts::new()
            .ttl_secs(60)
            .persistent()
            .swr(false)
            .deduplicate(false)
            .build();

        assert_eq!(opts.ttl, Some(Duration::from_secs(60)));
        assert_eq!(opts.backend, StorageKind::Persistent);
        assert!(!opts.stale_while_revalidate);
        assert!(!opts.deduplicate);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let opts = CacheOpts::new().ttl_mins(u64::MAX).build();
        assert_eq!(opts.ttl, Some(Duration::from_secs(u64::MAX)));

        let entry = crate::CacheEntry::with_ttl(
            (),
            crate::Timestamp::from_millis(1_000),
            opts.ttl,
            StorageKind::Transient,
        );
        assert_eq!(entry.expiry, Some(crate::Timestamp::from_millis(u64::MAX)));
    }

    #[test]
    fn test_class_policies() {
        assert_eq!(DataClass::Live.ttl(), Duration::from_secs(30));
        assert_eq!(DataClass::Live.backend(), StorageKind::Transient);
        assert_eq!(DataClass::Metadata.ttl(), Duration::from_secs(86_400));
        assert_eq!(DataClass::Static.ttl(), Duration::from_secs(604_800));
        assert_eq!(DataClass::Environmental.ttl(), Duration::from_secs(1_800));
        assert_eq!(DataClass::Environmental.backend(), StorageKind::Persistent);
    }

    #[test]
    fn test_class_then_override() {
        let opts = CacheOpts::class(DataClass::Metadata).swr(false).build();
        assert_eq!(opts.backend, StorageKind::Persistent);
        assert!(!opts.stale_while_revalidate);
    }

    #[test]
    fn test_from_duration() {
        let opts: CacheOptions = Duration::from_secs(300).into();
        assert_eq!(opts.ttl, Some(Duration::from_secs(300)));
    }
}
