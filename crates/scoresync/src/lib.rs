//! scoresync: client-side polling, caching and sync for live scoreboards
//!
//! # Features
//!
//! - **Tiered cache** (transient memory + persistent JSON files) with per-entry TTL
//! - **Stale-while-revalidate** reads with background refresh
//! - **Request deduplication** so concurrent callers share one fetch
//! - **Change detection** per entity against the last applied update
//! - **Adaptive polling** that speeds up while games are live
//! - **Metrics integration**
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scoresync::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = SyncContext::in_memory();
//!     let key = ResourceKey::new("nfl", "teams");
//!
//!     let teams = ctx
//!         .fetch_with_cache(
//!             &key,
//!             || async { Ok(vec!["KC".to_string(), "BUF".to_string()]) },
//!             DataClass::Metadata,
//!         )
//!         .await?;
//!     println!("{:?} ({:?})", teams.data, teams.freshness);
//!
//!     Ok(())
//! }
//! ```

pub mod change;
mod context;
mod dedup;
mod feed;
mod notify;
mod poller;
mod queue;
pub mod scheduler;

// Re-export core
pub use scoresync_core::*;

// Re-export storage
pub use scoresync_storage::{
    FileBackend, FileConfig, MemoryBackend, MemoryConfig, StoreConfig, TieredStore,
};

pub use change::{Entity, EntityDiff, Phase};
pub use context::{Fetched, Freshness, SyncConfig, SyncContext};
pub use dedup::{Deduplicator, InFlight};
pub use feed::{IntervalHistory, PollingState};
pub use notify::{ChangeEvent, ChangeNotifier, Subscription};
pub use poller::{FeedPoller, FeedSnapshot, PollOutcome};
pub use queue::UpdateQueue;
pub use scheduler::{PollScheduler, RetryPolicy, ScheduleConfig, SchedulerState, Visibility};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CacheKey, CacheOptions, CacheOpts, DataClass, Entity, FeedPoller, FeedSnapshot, Fetched,
        Freshness, Phase, ResourceKey, Result, StorageKind, SyncConfig, SyncContext, SyncError,
        Visibility,
    };
}
