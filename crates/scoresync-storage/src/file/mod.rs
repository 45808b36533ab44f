//! Persistent file backend

mod backend;
mod config;

pub use backend::FileBackend;
pub use config::{DEFAULT_KEY_PREFIX, FileConfig};
