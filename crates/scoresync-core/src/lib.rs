//! scoresync-core: Core traits and types for the scoresync library
//!
//! This crate provides the foundational types and traits used throughout
//! the scoresync ecosystem: cache entries and policies, resource keys,
//! the storage backend trait and the metrics hooks.

mod error;
mod traits;
mod types;

pub use error::{Result, SyncError};
pub use traits::*;
pub use types::*;
