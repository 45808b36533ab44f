//! Configuration for the file backend

use std::path::PathBuf;

/// Prefix every persisted entry's file name starts with
pub const DEFAULT_KEY_PREFIX: &str = "scoreboard_cache_";

/// Configuration for the persistent file backend
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Directory holding one JSON file per entry
    pub dir: PathBuf,

    /// Namespace prefix for entry file names
    pub key_prefix: String,

    /// Maximum total bytes of persisted entries (`None` = unlimited)
    pub quota_bytes: Option<u64>,
}

impl FileConfig {
    /// Create new config rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            quota_bytes: None,
        }
    }

    /// Set key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set storage quota
    pub fn quota(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }
}
