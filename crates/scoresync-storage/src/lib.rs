//! scoresync-storage: Storage backends for scoresync
//!
//! - [`MemoryBackend`]: transient, in-process
//! - [`FileBackend`]: persistent, one JSON document per entry
//! - [`TieredStore`]: the cache store routing entries between the two

pub mod file;
pub mod memory;
pub mod tiered;

pub use file::{FileBackend, FileConfig};
pub use memory::{MemoryBackend, MemoryConfig};
pub use tiered::{StoreConfig, TieredStore};
