use std::time::Duration;
use tracing::{debug, trace};

use crate::{EvictionReason, StorageKind, SyncMetrics};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl SyncMetrics for TracingMetrics {
    fn record_hit(&self, key: &str, tier: StorageKind) {
        debug!(
            target: "scoresync",
            event = "hit",
            key = %key,
            tier = tier.as_str(),
            service = ?self.service_name,
            "Cache Hit"
        );
    }

    fn record_miss(&self, key: &str) {
        debug!(
            target: "scoresync",
            event = "miss",
            key = %key,
            service = ?self.service_name,
            "Cache Miss"
        );
    }

    fn record_stale_hit(&self, key: &str) {
        debug!(
            target: "scoresync",
            event = "stale_hit",
            key = %key,
            service = ?self.service_name,
            "Cache Stale Hit"
        );
    }

    fn record_fetch(&self, key: &str, duration: Duration, success: bool) {
        trace!(
            target: "scoresync",
            event = "fetch",
            key = %key,
            success,
            duration_ms = duration.as_millis(),
            service = ?self.service_name,
            "Upstream Fetch"
        );
    }

    fn record_dedup_join(&self, key: &str) {
        trace!(
            target: "scoresync",
            event = "dedup_join",
            key = %key,
            service = ?self.service_name,
            "Joined In-Flight Fetch"
        );
    }

    fn record_change(&self, key: &str, changed_entities: usize) {
        debug!(
            target: "scoresync",
            event = "change",
            key = %key,
            changed_entities,
            service = ?self.service_name,
            "Update Applied"
        );
    }

    fn record_fallback(&self, key: &str) {
        debug!(
            target: "scoresync",
            event = "fallback",
            key = %key,
            service = ?self.service_name,
            "Persistent Write Fell Back To Transient"
        );
    }

    fn record_eviction(&self, reason: EvictionReason) {
        debug!(
            target: "scoresync",
            event = "eviction",
            reason = reason.as_str(),
            service = ?self.service_name,
            "Cache Eviction"
        );
    }
}
