//! Stale-while-revalidate orchestration

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use scoresync_core::{
    CacheKey, CacheOptions, CacheResult, Clock, EvictionReason, NoopMetrics, Result, SyncError,
    SyncMetrics, Timestamp,
};
use scoresync_storage::{StoreConfig, TieredStore};

use crate::dedup::Deduplicator;
use crate::notify::{ChangeNotifier, Subscription};
use crate::scheduler::{RetryPolicy, ScheduleConfig};

/// Configuration for a [`SyncContext`]
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Storage tiers
    pub store: StoreConfig,
    /// Polling intervals for feeds
    pub schedule: ScheduleConfig,
    /// Backoff after failed polls
    pub retry: RetryPolicy,
    /// Master switch for request deduplication
    pub deduplicate: bool,
    /// Master switch for serving stale data while revalidating
    pub stale_while_revalidate: bool,
    /// Upper bound of the random delay before a poller's first poll
    pub initial_stagger: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            schedule: ScheduleConfig::default(),
            retry: RetryPolicy::default(),
            deduplicate: true,
            stale_while_revalidate: true,
            initial_stagger: Duration::from_millis(500),
        }
    }
}

impl SyncConfig {
    /// Use a specific polling schedule
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// Use a specific retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Start pollers without a random delay
    pub fn no_stagger(mut self) -> Self {
        self.initial_stagger = Duration::ZERO;
        self
    }
}

/// Where a returned value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fetched upstream for this call
    Fresh,
    /// Served from cache within its TTL
    Cached,
    /// Served from cache past its TTL; a refresh is running
    Stale,
}

/// A value plus when it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub freshness: Freshness,
    pub last_updated: Timestamp,
}

impl<T> Fetched<T> {
    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            freshness: self.freshness,
            last_updated: self.last_updated,
        }
    }
}

/// Shared handle tying store, deduplication and notifications together
///
/// Build one per application (or per test) and clone it into every
/// consumer; clones share all state.
#[derive(Clone)]
pub struct SyncContext {
    store: TieredStore,
    dedup: Deduplicator<Value>,
    notifier: ChangeNotifier,
    metrics: Arc<dyn SyncMetrics>,
    config: Arc<SyncConfig>,
}

impl SyncContext {
    /// Create a context over `store` with default settings
    pub fn new(store: TieredStore) -> Self {
        Self::with_config(store, SyncConfig::default())
    }

    /// Create a context over `store` with explicit settings
    ///
    /// `config.store` is ignored; the store is already built.
    pub fn with_config(store: TieredStore, config: SyncConfig) -> Self {
        Self {
            store,
            dedup: Deduplicator::new(),
            notifier: ChangeNotifier::new(),
            metrics: Arc::new(NoopMetrics),
            config: Arc::new(config),
        }
    }

    /// Build the store described by `config.store` and wrap it
    pub async fn from_config(config: SyncConfig) -> Result<Self> {
        let store = TieredStore::from_config(&config.store).await?;
        Ok(Self::with_config(store, config))
    }

    /// In-memory context with default settings
    pub fn in_memory() -> Self {
        Self::new(TieredStore::in_memory())
    }

    /// Report to a metrics collector (shared with the store)
    pub fn with_metrics(mut self, metrics: impl SyncMetrics) -> Self {
        let metrics: Arc<dyn SyncMetrics> = Arc::new(metrics);
        self.store = self.store.with_metrics(metrics.clone());
        self.dedup = self.dedup.with_metrics(metrics.clone());
        self.metrics = metrics;
        self
    }

    /// Use `clock` for expiry and update timestamps
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.store = self.store.with_clock(clock);
        self
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<dyn SyncMetrics> {
        &self.metrics
    }

    pub fn now(&self) -> Timestamp {
        self.store.clock().now()
    }

    /// Read through the cache, serving stale data while revalidating
    ///
    /// - joins a fetch already in flight for `key`
    /// - returns a fresh cached value without fetching
    /// - returns an expired value immediately and refreshes it in the
    ///   background when stale-while-revalidate is on
    /// - otherwise fetches, writes through and returns the result
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        key: impl CacheKey,
        fetch: F,
        options: impl Into<CacheOptions>,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = key.cache_key();
        let options = self.effective(options.into());

        if options.deduplicate {
            if let Some(flight) = self.dedup.join(&key) {
                debug!(key = %key, "joining in-flight fetch");
                let value = flight.wait().await?;
                return self.fetched(value, Freshness::Fresh, self.now());
            }
        }

        match self.store.lookup(&key).await {
            CacheResult::Hit(entry) => {
                match decode::<T>(entry.data) {
                    Ok(data) => {
                        debug!(key = %key, "cache hit");
                        return Ok(Fetched {
                            data,
                            freshness: Freshness::Cached,
                            last_updated: entry.created_at,
                        });
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "cached payload has unexpected shape, refetching");
                        self.store.remove(&key).await;
                    }
                }
            }
            CacheResult::Stale(entry) if options.stale_while_revalidate => {
                match decode::<T>(entry.data) {
                    Ok(data) => {
                        debug!(key = %key, "serving stale value, revalidating");
                        self.spawn_revalidate(key, fetch, options);
                        return Ok(Fetched {
                            data,
                            freshness: Freshness::Stale,
                            last_updated: entry.created_at,
                        });
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "cached payload has unexpected shape, refetching");
                        self.store.remove(&key).await;
                    }
                }
            }
            CacheResult::Stale(_) => debug!(key = %key, "cached value expired"),
            CacheResult::Miss => debug!(key = %key, "cache miss"),
        }

        let value = self.fetch_and_store(key, fetch, options).await?;
        self.fetched(value, Freshness::Fresh, self.now())
    }

    /// Fetch unconditionally, write through and return the new value
    ///
    /// Still joins an identical fetch already in flight.
    pub async fn refresh<T, F, Fut>(
        &self,
        key: impl CacheKey,
        fetch: F,
        options: impl Into<CacheOptions>,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let options = self.effective(options.into());
        let value = self.fetch_and_store(key.cache_key(), fetch, options).await?;
        self.fetched(value, Freshness::Fresh, self.now())
    }

    /// Cached value for `key`, expired or not
    pub async fn peek<T: DeserializeOwned>(&self, key: impl CacheKey) -> Option<T> {
        self.store.get(&key.cache_key(), false).await
    }

    /// Drop `key` from every tier
    ///
    /// The next fetched value notifies subscribers even if it equals the
    /// dropped one.
    pub async fn invalidate(&self, key: impl CacheKey) -> bool {
        let key = key.cache_key();
        self.notifier.forget(&key);
        let removed = self.store.remove(&key).await;
        if removed {
            self.metrics.record_eviction(EvictionReason::Invalidated);
        }
        removed
    }

    /// Listen for confirmed changes to `key`
    pub fn subscribe(&self, key: impl CacheKey) -> Subscription {
        self.notifier.subscribe(&key.cache_key())
    }

    /// Whether a fetch for `key` is running
    pub fn is_fetching(&self, key: impl CacheKey) -> bool {
        self.dedup.is_in_flight(&key.cache_key())
    }

    fn effective(&self, mut options: CacheOptions) -> CacheOptions {
        options.deduplicate &= self.config.deduplicate;
        options.stale_while_revalidate &= self.config.stale_while_revalidate;
        options
    }

    fn fetched<T: DeserializeOwned>(
        &self,
        value: Value,
        freshness: Freshness,
        last_updated: Timestamp,
    ) -> Result<Fetched<T>> {
        Ok(Fetched {
            data: decode(value)?,
            freshness,
            last_updated,
        })
    }

    /// Fetch (deduplicated if enabled), then write through and notify
    async fn fetch_and_store<T, F, Fut>(
        &self,
        key: String,
        fetch: F,
        options: CacheOptions,
    ) -> Result<Value>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let deduplicate = options.deduplicate;
        let ctx = self.clone();
        let run = {
            let key = key.clone();
            move || async move {
                let start = Instant::now();
                let result = fetch().await;
                ctx.metrics.record_fetch(&key, start.elapsed(), result.is_ok());

                let data = result?;
                let value = serde_json::to_value(&data)
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                ctx.commit(&key, value.clone(), &options).await;
                Ok(value)
            }
        };

        if deduplicate {
            self.dedup.dedupe(&key, run).await
        } else {
            run().await
        }
    }

    /// Write through and notify subscribers if the value changed
    async fn commit(&self, key: &str, value: Value, options: &CacheOptions) {
        if self.notifier.needs_baseline(key) {
            if let Some(previous) = self.store.get_entry(key).await {
                self.notifier.seed(key, previous.data);
            }
        }
        let tier = self.store.set_value(key, value.clone(), options).await;
        debug!(key = %key, tier = tier.as_str(), "stored fetched value");
        self.notifier.publish_if_changed(key, value, self.now());
    }

    fn spawn_revalidate<T, F, Fut>(&self, key: String, fetch: F, options: CacheOptions)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let ctx = self.clone();
        let task_key = key.clone();
        let spawned = self.dedup.try_spawn_refresh(&key, move || async move {
            if let Err(e) = ctx.fetch_and_store(task_key.clone(), fetch, options).await {
                warn!(key = %task_key, error = %e, "background refresh failed, keeping stale value");
            }
        });
        if !spawned {
            debug!(key = %key, "refresh already running");
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| SyncError::Deserialization(e.to_string()))
}
