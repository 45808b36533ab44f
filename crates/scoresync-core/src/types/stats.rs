//! Cache statistics

/// Statistics for cache operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of fresh cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of expired entries served under stale-while-revalidate
    pub stale_hits: u64,
    /// Number of write operations
    pub writes: u64,
    /// Number of delete operations
    pub deletes: u64,
    /// Number of capacity or quota evictions
    pub evictions: u64,
    /// Number of entries removed by expiry sweeps
    pub expired: u64,
    /// Number of persistent writes redirected to the transient backend
    pub fallbacks: u64,
    /// Current number of entries
    pub size: usize,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.hits + self.stale_hits) as f64 / total as f64
        }
    }

    /// Total lookups (hits + stale hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.stale_hits + self.misses
    }

    /// Merge stats from another backend
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.stale_hits += other.stale_hits;
        self.writes += other.writes;
        self.deletes += other.deletes;
        self.evictions += other.evictions;
        self.expired += other.expired;
        self.fallbacks += other.fallbacks;
        self.size += other.size;
    }
}
