//! Core traits for cache operations

mod backend;
mod key;
mod metrics;
mod tracing_metrics;

pub use backend::CacheBackend;
pub use key::{CacheKey, ResourceKey};
pub use self::metrics::{EvictionReason, NoopMetrics, SyncMetrics};
pub use tracing_metrics::TracingMetrics;

#[cfg(feature = "metrics")]
pub use self::metrics::MetricsCrateAdapter;
