//! Single-flight request deduplication

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

use scoresync_core::{NoopMetrics, Result, SyncError, SyncMetrics};

type Flights<T> = DashMap<String, broadcast::Sender<Result<T>>>;

/// Shares one in-flight operation per key between concurrent callers
///
/// The first caller for a key becomes the leader and runs the operation;
/// everyone arriving while it runs subscribes to its result. All of them
/// observe the same value or the same error. The key is unregistered as
/// soon as the leader settles, so the next call starts fresh.
///
/// Cloning creates a new handle to the SAME in-flight map.
pub struct Deduplicator<T> {
    inflight: Arc<Flights<T>>,
    // Keys with a detached background refresh running
    refreshing: Arc<DashMap<String, ()>>,
    metrics: Arc<dyn SyncMetrics>,
}

impl<T> Clone for Deduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            inflight: self.inflight.clone(),
            refreshing: self.refreshing.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> Default for Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on an operation another caller is running
pub struct InFlight<T> {
    rx: broadcast::Receiver<Result<T>>,
}

impl<T: Clone> InFlight<T> {
    /// Wait for the leader's result
    pub async fn wait(mut self) -> Result<T> {
        match self.rx.recv().await {
            Ok(result) => result,
            // Leader dropped before sending (cancelled or panicked)
            Err(_) => Err(SyncError::Internal(
                "in-flight request abandoned".to_string(),
            )),
        }
    }
}

/// Unregisters the leader's key however its future ends
struct FlightGuard<'a, T> {
    inflight: &'a Flights<T>,
    key: &'a str,
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        self.inflight.remove(self.key);
    }
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            refreshing: Arc::new(DashMap::new()),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report joins to a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<dyn SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run `fetch` for `key`, or join the run already in flight
    pub async fn dedupe<F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // Scope the entry so the shard lock is released before any await
        let action = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(o) => Ok(o.get().subscribe()),
            Entry::Vacant(v) => {
                let (tx, _rx) = broadcast::channel(1);
                v.insert(tx.clone());
                Err(tx)
            }
        };

        match action {
            Ok(rx) => {
                self.metrics.record_dedup_join(key);
                InFlight { rx }.wait().await
            }
            Err(tx) => {
                let guard = FlightGuard {
                    inflight: &self.inflight,
                    key,
                };
                let result = fetch().await;

                // Unregister first so late arrivals start a new request
                drop(guard);

                if tx.receiver_count() > 0 {
                    let _ = tx.send(result.clone());
                }
                result
            }
        }
    }

    /// Subscribe to the operation in flight for `key`, if any
    pub fn join(&self, key: &str) -> Option<InFlight<T>> {
        let rx = self.inflight.get(key)?.subscribe();
        self.metrics.record_dedup_join(key);
        Some(InFlight { rx })
    }

    /// Check whether an operation is running for `key`
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }

    /// Number of keys with an operation running
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Spawn a detached background task for `key` unless one is running
    ///
    /// Returns `true` if a task was spawned.
    pub fn try_spawn_refresh<F, Fut>(&self, key: &str, task_factory: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let should_run = match self.refreshing.entry(key.to_string()) {
            Entry::Vacant(v) => {
                v.insert(());
                true
            }
            Entry::Occupied(_) => false,
        };

        if should_run {
            let task = task_factory();
            let map = self.refreshing.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                task.await;
                map.remove(&key);
            });
        }
        should_run
    }

    /// Check whether a background refresh is running for `key`
    pub fn is_refreshing(&self, key: &str) -> bool {
        self.refreshing.contains_key(key)
    }
}
