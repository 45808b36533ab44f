//! Core types for cache operations

mod entry;
mod options;
mod result;
mod stats;
mod time;

pub use entry::{CacheEntry, StorageKind};
pub use options::{CacheOptions, CacheOpts, DataClass};
pub use result::CacheResult;
pub use stats::CacheStats;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
