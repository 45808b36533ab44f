use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use scoresync_core::{
    CacheBackend, CacheEntry, CacheStats, Result, StorageKind, SyncError, Timestamp,
};

use super::config::FileConfig;

const FILE_SUFFIX: &str = ".json";

/// Distinguishes temp files of concurrent writers
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default)]
struct FileStats {
    writes: u64,
    deletes: u64,
    expired: u64,
}

/// Persistent backend storing one JSON document per entry
///
/// Entries are written as `{prefix}{hex(key)}.json` so arbitrary keys map to
/// safe file names and several caches can share a directory under
/// different prefixes.
#[derive(Clone)]
pub struct FileBackend {
    config: FileConfig,
    stats: Arc<RwLock<FileStats>>,
}

impl FileBackend {
    /// Create a new file backend, creating the directory if needed
    pub async fn new(config: FileConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir).await?;
        Ok(Self {
            config,
            stats: Arc::new(RwLock::new(FileStats::default())),
        })
    }

    /// Path of the file holding `key`
    fn path_for(&self, key: &str) -> PathBuf {
        self.config.dir.join(format!(
            "{}{}{}",
            self.config.key_prefix,
            encode_key(key),
            FILE_SUFFIX
        ))
    }

    /// Decode a file name back into a key, `None` for foreign files
    fn key_for(&self, file_name: &str) -> Option<String> {
        let hex = file_name
            .strip_prefix(self.config.key_prefix.as_str())?
            .strip_suffix(FILE_SUFFIX)?;
        decode_key(hex)
    }

    /// File names and sizes of every entry under our prefix
    async fn entry_files(&self) -> Result<Vec<(String, u64)>> {
        let mut files = Vec::new();
        let mut dir = fs::read_dir(&self.config.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let Some(name) = item.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(key) = self.key_for(&name) {
                let size = item.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push((key, size));
            }
        }
        Ok(files)
    }

    /// Bytes currently used, not counting the file for `except`
    async fn usage_excluding(&self, except: &str) -> Result<u64> {
        Ok(self
            .entry_files()
            .await?
            .into_iter()
            .filter(|(key, _)| key != except)
            .map(|(_, size)| size)
            .sum())
    }

    /// Total bytes used by persisted entries
    pub async fn usage(&self) -> Result<u64> {
        self.usage_excluding("").await
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Persistent
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>> {
        let bytes = match fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry<Value> = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Deserialization(e.to_string()))?;
        Ok(Some(entry))
    }

    async fn set(&self, key: &str, entry: CacheEntry<Value>) -> Result<usize> {
        let entry = CacheEntry {
            storage_backend: StorageKind::Persistent,
            ..entry
        };
        let serialized =
            serde_json::to_vec(&entry).map_err(|e| SyncError::Serialization(e.to_string()))?;

        if let Some(quota) = self.config.quota_bytes {
            let used = self.usage_excluding(key).await?;
            let needed = serialized.len() as u64;
            if used + needed > quota {
                return Err(SyncError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }

        // Write-then-rename so readers never see a half-written document
        let path = self.path_for(key);
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let written = match fs::write(&tmp, &serialized).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        self.stats.write().writes += 1;
        Ok(0)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => {
                self.stats.write().deletes += 1;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .entry_files()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys().await? {
            let purge = match self.get(&key).await {
                Ok(Some(entry)) => entry.is_expired(now),
                Ok(None) => false,
                // Unreadable documents can never be served
                Err(_) => true,
            };
            if purge && self.delete(&key).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            self.stats.write().expired += removed as u64;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        for key in self.keys().await? {
            self.delete(&key).await?;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let size = self.len().await?;
        let stats = self.stats.read();
        Ok(CacheStats {
            writes: stats.writes,
            deletes: stats.deletes,
            expired: stats.expired,
            size,
            ..Default::default()
        })
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entry_files().await?.len())
    }
}

fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_key(hex: &str) -> Option<String> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
