//! Feed polling loop
//!
//! A [`FeedPoller`] keeps one feed of entities current: it reads through the
//! cache, diffs each fetch against what was last applied, debounces, and
//! publishes snapshots on a watch channel. Its cadence adapts to whether
//! anything is live and whether the consumer is visible.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use scoresync_core::{CacheKey, CacheOptions, DataClass, ResourceKey, Result, SyncError, Timestamp};

use crate::change::{self, Entity, EntityDiff};
use crate::context::SyncContext;
use crate::feed::PollingState;
use crate::queue::UpdateQueue;
use crate::scheduler::{PollScheduler, RetryPolicy, SchedulerState, Visibility};

type FetchFn<E> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<E>>> + Send + Sync>;

/// What consumers of a feed see
#[derive(Debug, Clone)]
pub struct FeedSnapshot<E> {
    pub entities: Vec<E>,
    /// No data applied yet for the current feed
    pub loading: bool,
    /// Last poll failed; `entities` are from before the failure
    pub error: Option<SyncError>,
    pub last_updated: Option<Timestamp>,
    /// Diff that produced `entities`
    pub diff: EntityDiff,
}

impl<E> Default for FeedSnapshot<E> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            loading: true,
            error: None,
            last_updated: None,
            diff: EntityDiff::default(),
        }
    }
}

/// Result of one successful poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub diff: EntityDiff,
    /// Whether the fetched feed replaced the published one
    pub applied: bool,
    pub state: SchedulerState,
    pub next_interval: Duration,
}

struct Target<E> {
    key: ResourceKey,
    fetch: FetchFn<E>,
}

impl<E> Clone for Target<E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch: self.fetch.clone(),
        }
    }
}

/// Polls one feed and publishes its entities
pub struct FeedPoller<E> {
    ctx: SyncContext,
    target: Mutex<Target<E>>,
    options: CacheOptions,
    scheduler: PollScheduler,
    retry: RetryPolicy,
    state: Mutex<PollingState>,
    queue: UpdateQueue<PollOutcome>,
    visibility: watch::Sender<Visibility>,
    snapshot: watch::Sender<FeedSnapshot<E>>,
    alive: AtomicBool,
}

impl<E> FeedPoller<E>
where
    E: Entity + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Poll `key` with `fetch`, caching as live data
    pub fn new<F, Fut>(ctx: SyncContext, key: ResourceKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<E>>> + Send + 'static,
    {
        let config = ctx.config();
        let scheduler = PollScheduler::new(config.schedule.clone());
        let retry = config.retry.clone();
        let state = PollingState::new(key.cache_key(), config.schedule.history_len);

        Self {
            target: Mutex::new(Target {
                key,
                fetch: boxed(fetch),
            }),
            options: DataClass::Live.options(),
            scheduler,
            retry,
            state: Mutex::new(state),
            queue: UpdateQueue::new(),
            visibility: watch::Sender::new(Visibility::Visible),
            snapshot: watch::Sender::new(FeedSnapshot::default()),
            alive: AtomicBool::new(true),
            ctx,
        }
    }

    /// Cache with `options` instead of the live-data defaults
    pub fn with_options(mut self, options: impl Into<CacheOptions>) -> Self {
        self.options = options.into();
        self
    }

    /// Watch published snapshots
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot<E>> {
        self.snapshot.subscribe()
    }

    /// Currently published snapshot
    pub fn snapshot(&self) -> FeedSnapshot<E> {
        self.snapshot.borrow().clone()
    }

    /// Key of the feed being polled
    pub fn key(&self) -> ResourceKey {
        self.target.lock().key.clone()
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.borrow()
    }

    /// Tell the poller whether its consumer is shown
    ///
    /// A running loop polls immediately when the consumer becomes visible
    /// and stretches its interval while hidden.
    pub fn set_visibility(&self, visibility: Visibility) {
        let changed = self.visibility.send_if_modified(|current| {
            let changed = *current != visibility;
            *current = visibility;
            changed
        });
        if changed {
            debug!(feed = %self.key(), ?visibility, "visibility changed");
        }
    }

    /// Regime implied by the published entities and visibility
    pub fn state(&self) -> SchedulerState {
        let snapshot = self.snapshot.borrow();
        self.scheduler
            .state(snapshot.entities.iter().map(Entity::phase), self.visibility())
    }

    /// Interval implied by the published entities and visibility
    pub fn current_interval(&self) -> Duration {
        let snapshot = self.snapshot.borrow();
        self.scheduler
            .next_interval(snapshot.entities.iter().map(Entity::phase), self.visibility())
    }

    /// Mean gap between recent polls
    pub fn observed_cadence(&self) -> Option<Duration> {
        self.state.lock().history().cadence()
    }

    /// Switch to another feed
    ///
    /// Polling state and the published snapshot are reset so nothing is
    /// diffed across feeds.
    pub fn retarget<F, Fut>(&self, key: ResourceKey, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<E>>> + Send + 'static,
    {
        let feed = key.cache_key();
        let mut state = self.state.lock();
        {
            let mut target = self.target.lock();
            target.key = key;
            target.fetch = boxed(fetch);
        }
        if state.bind(&feed) {
            info!(feed = %feed, "feed changed, polling state reset");
            self.snapshot.send_replace(FeedSnapshot::default());
        }
    }

    /// Stop committing results; a running loop exits at its next wakeup
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Poll once
    ///
    /// Overlapping calls share one update. `None` means the poll failed (the
    /// error is published on the snapshot) or the poller was shut down. A
    /// result for a feed replaced by [`retarget`](Self::retarget) while it
    /// was in flight is discarded and reported as not applied.
    pub async fn poll_once(&self) -> Option<PollOutcome> {
        if !self.is_alive() {
            return None;
        }

        let target = self.target.lock().clone();
        let feed_key = target.key.cache_key();
        let feed = feed_key.as_str();
        let first = self.state.lock().last_poll().is_none();

        self.queue
            .enqueue(
                feed,
                || self.load(&target, first),
                |entities| async move { self.apply(feed, entities) },
            )
            .await
    }

    /// Poll until `shutdown` resolves or [`shutdown`](Self::shutdown) is called
    ///
    /// Starts after a random stagger, then sleeps the scheduled interval
    /// between polls. Failed polls are retried with backoff before falling
    /// back to the regular schedule.
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut visibility = self.visibility.subscribe();

        let stagger = self.initial_stagger();
        if !stagger.is_zero() {
            debug!(feed = %self.key(), ?stagger, "staggering first poll");
            tokio::select! {
                _ = &mut shutdown => {
                    self.shutdown();
                    return;
                }
                _ = tokio::time::sleep(stagger) => {}
            }
        }

        let mut failures = 0u32;
        while self.is_alive() {
            let mut delay = match self.poll_once().await {
                Some(outcome) => {
                    failures = 0;
                    outcome.next_interval
                }
                None if !self.is_alive() => break,
                None if self.retry.should_retry(failures) => {
                    let delay = self.retry.delay_for(failures);
                    failures += 1;
                    debug!(feed = %self.key(), attempt = failures, ?delay, "retrying failed poll");
                    delay
                }
                None => {
                    failures = 0;
                    self.current_interval()
                }
            };

            let _ = visibility.borrow_and_update();
            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        self.shutdown();
                        return;
                    }
                    _ = tokio::time::sleep(delay) => break,
                    changed = visibility.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        match *visibility.borrow_and_update() {
                            Visibility::Visible => break,
                            Visibility::Hidden => delay = self.current_interval(),
                        }
                    }
                }
            }
        }
    }

    fn initial_stagger(&self) -> Duration {
        let max = self.ctx.config().initial_stagger;
        let millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random_range(0..=millis))
    }

    /// Fetch through the cache, publishing failures on the snapshot
    ///
    /// `Ok(None)` means the fetch failed after the poller moved to another
    /// feed; the failure belongs to nobody and is dropped.
    async fn load(&self, target: &Target<E>, first: bool) -> Result<Option<Vec<E>>> {
        let fetch = target.fetch.clone();
        let call = move || fetch();
        let result = if first {
            self.ctx
                .fetch_with_cache(&target.key, call, self.options.clone())
                .await
        } else {
            self.ctx.refresh(&target.key, call, self.options.clone()).await
        };

        match result {
            Ok(fetched) => Ok(Some(fetched.data)),
            Err(e) => {
                let feed = target.key.cache_key();
                let state = self.state.lock();
                if state.feed() != feed {
                    debug!(feed = %feed, error = %e, "dropping failure for superseded feed");
                    return Ok(None);
                }
                warn!(feed = %feed, error = %e, "poll failed, keeping previous entities");
                if self.is_alive() {
                    self.snapshot.send_modify(|s| {
                        s.loading = false;
                        s.error = Some(e.clone());
                    });
                }
                Err(e)
            }
        }
    }

    /// Diff, debounce and publish a fetched feed
    fn apply(&self, feed: &str, entities: Option<Vec<E>>) -> Result<PollOutcome> {
        if !self.is_alive() {
            return Err(SyncError::Internal("poller shut down".to_string()));
        }

        let now = self.ctx.now();
        let visibility = self.visibility();
        let mut state = self.state.lock();
        let entities = match entities {
            Some(entities) if state.feed() == feed => entities,
            _ => {
                drop(state);
                debug!(feed = %feed, "discarding result for superseded feed");
                return Ok(self.superseded());
            }
        };
        state.record_poll(now);

        let signature = change::feed_signature(&entities);
        let snapshots = change::snapshot(&entities);
        let diff = if state.snapshots().is_some() && state.last_change_signature() == signature {
            EntityDiff::default()
        } else {
            change::diff_snapshots(state.snapshots(), &snapshots)
        };
        let phases = || entities.iter().map(Entity::phase);
        let outcome_state = self.scheduler.state(phases(), visibility);
        let next_interval = self.scheduler.next_interval(phases(), visibility);

        let mut applied = false;
        if !diff.is_applicable() {
            debug!(feed = %feed, "no tracked changes");
            self.snapshot.send_if_modified(|s| {
                let modified = s.loading || s.error.is_some();
                s.loading = false;
                s.error = None;
                modified
            });
        } else if !self.scheduler.should_apply(state.last_applied(), now) {
            debug!(feed = %feed, changed = diff.len(), "update debounced");
        } else {
            state.apply(now, signature, snapshots);
            self.ctx.metrics().record_change(feed, diff.len());
            debug!(
                feed = %feed,
                changed = diff.changed.len(),
                added = diff.added.len(),
                removed = diff.removed.len(),
                "applied update"
            );
            self.snapshot.send_replace(FeedSnapshot {
                entities,
                loading: false,
                error: None,
                last_updated: Some(now),
                diff: diff.clone(),
            });
            applied = true;
        }

        Ok(PollOutcome {
            diff,
            applied,
            state: outcome_state,
            next_interval,
        })
    }

    /// Outcome of a poll whose feed was replaced mid-flight
    fn superseded(&self) -> PollOutcome {
        PollOutcome {
            diff: EntityDiff::default(),
            applied: false,
            state: self.state(),
            next_interval: self.current_interval(),
        }
    }
}

fn boxed<E, F, Fut>(fetch: F) -> FetchFn<E>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<E>>> + Send + 'static,
{
    Arc::new(move || fetch().boxed())
}
