//! Metrics trait for sync observability

use std::time::Duration;

use crate::StorageKind;

/// Reason an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// TTL expired
    Expired,
    /// Capacity limit reached
    Capacity,
    /// Explicitly invalidated
    Invalidated,
    /// Persisted payload could not be read back
    Corrupt,
}

impl EvictionReason {
    /// Get reason as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Capacity => "capacity",
            EvictionReason::Invalidated => "invalidated",
            EvictionReason::Corrupt => "corrupt",
        }
    }
}

/// Trait for sync metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait SyncMetrics: Send + Sync + 'static {
    /// Record a fresh cache hit
    fn record_hit(&self, key: &str, tier: StorageKind);

    /// Record a cache miss
    fn record_miss(&self, key: &str);

    /// Record a stale hit (served stale while revalidating)
    fn record_stale_hit(&self, key: &str);

    /// Record a completed upstream fetch
    fn record_fetch(&self, key: &str, duration: Duration, success: bool);

    /// Record a caller joining an in-flight fetch instead of starting one
    fn record_dedup_join(&self, key: &str);

    /// Record an applied update and how many entities changed
    fn record_change(&self, key: &str, changed_entities: usize);

    /// Record a persistent write redirected to transient storage
    fn record_fallback(&self, key: &str);

    /// Record an eviction
    fn record_eviction(&self, reason: EvictionReason);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl SyncMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str, _tier: StorageKind) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_stale_hit(&self, _key: &str) {}

    #[inline]
    fn record_fetch(&self, _key: &str, _duration: Duration, _success: bool) {}

    #[inline]
    fn record_dedup_join(&self, _key: &str) {}

    #[inline]
    fn record_change(&self, _key: &str, _changed_entities: usize) {}

    #[inline]
    fn record_fallback(&self, _key: &str) {}

    #[inline]
    fn record_eviction(&self, _reason: EvictionReason) {}
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use scoresync_core::MetricsCrateAdapter;
///
/// let metrics = MetricsCrateAdapter::new("scoresync");
/// // Emits: scoresync_hits_total, scoresync_fetch_duration_seconds, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl SyncMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str, tier: StorageKind) {
        metrics::counter!(self.metric_name("hits_total"), "tier" => tier.as_str()).increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!(self.metric_name("misses_total")).increment(1);
    }

    fn record_stale_hit(&self, _key: &str) {
        metrics::counter!(self.metric_name("stale_hits_total")).increment(1);
    }

    fn record_fetch(&self, _key: &str, duration: Duration, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        metrics::histogram!(
            self.metric_name("fetch_duration_seconds"),
            "outcome" => outcome
        )
        .record(duration.as_secs_f64());
    }

    fn record_dedup_join(&self, _key: &str) {
        metrics::counter!(self.metric_name("dedup_joins_total")).increment(1);
    }

    fn record_change(&self, _key: &str, changed_entities: usize) {
        metrics::counter!(self.metric_name("updates_applied_total")).increment(1);
        metrics::counter!(self.metric_name("entities_changed_total"))
            .increment(changed_entities as u64);
    }

    fn record_fallback(&self, _key: &str) {
        metrics::counter!(self.metric_name("storage_fallbacks_total")).increment(1);
    }

    fn record_eviction(&self, reason: EvictionReason) {
        metrics::counter!(
            self.metric_name("evictions_total"),
            "reason" => reason.as_str()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_reason_as_str() {
        assert_eq!(EvictionReason::Expired.as_str(), "expired");
        assert_eq!(EvictionReason::Corrupt.as_str(), "corrupt");
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics;
        metrics.record_hit("key", StorageKind::Transient);
        metrics.record_miss("key");
        metrics.record_fetch("key", Duration::from_millis(1), true);
        metrics.record_change("key", 2);
    }
}
