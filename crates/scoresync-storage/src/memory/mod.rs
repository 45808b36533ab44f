//! In-memory transient backend

mod backend;

pub use backend::{MemoryBackend, MemoryConfig};
