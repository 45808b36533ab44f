//! Per-resource update serialization

use std::future::Future;
use tracing::warn;

use scoresync_core::Result;

use crate::dedup::Deduplicator;

/// Runs at most one fetch-and-process update per resource at a time
///
/// A caller arriving while an update for the same resource is running gets
/// that update's result instead of starting another. Failures are logged
/// with the resource id and surface as `None`.
pub struct UpdateQueue<R> {
    running: Deduplicator<Option<R>>,
}

impl<R> Clone for UpdateQueue<R> {
    fn clone(&self) -> Self {
        Self {
            running: self.running.clone(),
        }
    }
}

impl<R> Default for UpdateQueue<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> UpdateQueue<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            running: Deduplicator::new(),
        }
    }

    /// Fetch then process `resource_id`, or await the update already running
    pub async fn enqueue<T, F, Fut, P, PFut>(
        &self,
        resource_id: &str,
        fetch: F,
        process: P,
    ) -> Option<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnOnce(T) -> PFut,
        PFut: Future<Output = Result<R>>,
    {
        let outcome = self
            .running
            .dedupe(resource_id, || async move {
                let update = async move {
                    let value = fetch().await?;
                    process(value).await
                };
                match update.await {
                    Ok(result) => Ok(Some(result)),
                    Err(e) => {
                        warn!(resource = %resource_id, error = %e, "update failed");
                        Ok(None)
                    }
                }
            })
            .await;

        // Only reachable when a joined update was abandoned
        outcome.unwrap_or_else(|e| {
            warn!(resource = %resource_id, error = %e, "update failed");
            None
        })
    }

    /// Whether an update for `resource_id` is running
    pub fn is_running(&self, resource_id: &str) -> bool {
        self.running.is_in_flight(resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoresync_core::SyncError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_overlapping_updates_share_one_run() {
        let queue = UpdateQueue::<String>::new();
        let fetches = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let run = || {
            let fetches = fetches.clone();
            let processed = processed.clone();
            let gate = gate.clone();
            let queue = queue.clone();
            async move {
                queue
                    .enqueue(
                        "nfl:scoreboard",
                        || async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            gate.notified().await;
                            Ok(3u32)
                        },
                        |n| async move {
                            processed.fetch_add(1, Ordering::SeqCst);
                            Ok(format!("{n} games"))
                        },
                    )
                    .await
            }
        };

        let release = async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            gate.notify_one();
        };
        let (a, b, _) = tokio::join!(run(), run(), release);

        assert_eq!(a.as_deref(), Some("3 games"));
        assert_eq!(b.as_deref(), Some("3 games"));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(processed.load(Ordering::SeqCst), 1);
        assert!(!queue.is_running("nfl:scoreboard"));
    }

    #[tokio::test]
    async fn test_failure_is_none_and_isolated() {
        let queue = UpdateQueue::<u32>::new();

        let (failed, ok) = tokio::join!(
            queue.enqueue(
                "nba",
                || async { Err::<u32, _>(SyncError::fetch("HTTP 500")) },
                |n| async move { Ok(n) },
            ),
            queue.enqueue("nhl", || async { Ok(4u32) }, |n| async move { Ok(n * 2) }),
        );
        assert_eq!(failed, None);
        assert_eq!(ok, Some(8));

        // Entry cleared after failure
        assert!(!queue.is_running("nba"));
        let retried = queue
            .enqueue("nba", || async { Ok(1u32) }, |n| async move { Ok(n) })
            .await;
        assert_eq!(retried, Some(1));
    }

    #[tokio::test]
    async fn test_process_error_is_none() {
        let queue = UpdateQueue::<u32>::new();
        let result = queue
            .enqueue(
                "mlb",
                || async { Ok(1u32) },
                |_| async { Err(SyncError::Internal("bad payload".into())) },
            )
            .await;
        assert_eq!(result, None);
    }
}
