//! Per-feed polling state

use std::collections::VecDeque;
use std::time::Duration;

use scoresync_core::Timestamp;

use crate::change::Snapshots;

/// Bounded record of gaps between consecutive polls
#[derive(Debug, Clone)]
pub struct IntervalHistory {
    gaps: VecDeque<Duration>,
    capacity: usize,
}

impl IntervalHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            gaps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a gap, dropping the oldest once full
    pub fn push(&mut self, gap: Duration) {
        if self.capacity == 0 {
            return;
        }
        if self.gaps.len() == self.capacity {
            self.gaps.pop_front();
        }
        self.gaps.push_back(gap);
    }

    /// Mean gap, `None` when empty
    pub fn cadence(&self) -> Option<Duration> {
        let count = u32::try_from(self.gaps.len()).ok().filter(|n| *n > 0)?;
        Some(self.gaps.iter().sum::<Duration>() / count)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.gaps.iter()
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn clear(&mut self) {
        self.gaps.clear();
    }
}

/// What a poller remembers about the feed it watches
///
/// Bound to one feed identity; binding a different one resets everything
/// so diffs never compare across feeds.
#[derive(Debug, Clone)]
pub struct PollingState {
    feed: String,
    last_poll: Option<Timestamp>,
    last_applied: Option<Timestamp>,
    last_change_signature: String,
    snapshots: Option<Snapshots>,
    history: IntervalHistory,
}

impl PollingState {
    pub fn new(feed: impl Into<String>, history_len: usize) -> Self {
        Self {
            feed: feed.into(),
            last_poll: None,
            last_applied: None,
            last_change_signature: String::new(),
            snapshots: None,
            history: IntervalHistory::new(history_len),
        }
    }

    /// Point at `feed`, resetting if it differs from the current one
    ///
    /// Returns `true` if the state was reset.
    pub fn bind(&mut self, feed: &str) -> bool {
        if self.feed == feed {
            return false;
        }
        self.feed = feed.to_string();
        self.reset();
        true
    }

    /// Forget everything observed so far
    pub fn reset(&mut self) {
        self.last_poll = None;
        self.last_applied = None;
        self.last_change_signature.clear();
        self.snapshots = None;
        self.history.clear();
    }

    /// Note a completed poll at `now`
    pub fn record_poll(&mut self, now: Timestamp) {
        if let Some(previous) = self.last_poll {
            self.history.push(now.saturating_since(previous));
        }
        self.last_poll = Some(now);
    }

    /// Commit an applied update
    pub fn apply(&mut self, now: Timestamp, signature: String, snapshots: Snapshots) {
        self.last_applied = Some(now);
        self.last_change_signature = signature;
        self.snapshots = Some(snapshots);
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn last_poll(&self) -> Option<Timestamp> {
        self.last_poll
    }

    pub fn last_applied(&self) -> Option<Timestamp> {
        self.last_applied
    }

    pub fn last_change_signature(&self) -> &str {
        &self.last_change_signature
    }

    /// Per-entity signatures of the last applied update
    pub fn snapshots(&self) -> Option<&Snapshots> {
        self.snapshots.as_ref()
    }

    pub fn history(&self) -> &IntervalHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_bounded() {
        let mut history = IntervalHistory::new(3);
        for secs in [10, 20, 30, 40] {
            history.push(Duration::from_secs(secs));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.iter().copied().collect::<Vec<_>>(),
            vec![Duration::from_secs(20), Duration::from_secs(30), Duration::from_secs(40)]
        );
        assert_eq!(history.cadence(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_empty_history() {
        let mut history = IntervalHistory::new(0);
        history.push(Duration::from_secs(1));
        assert!(history.is_empty());
        assert_eq!(history.cadence(), None);
    }

    #[test]
    fn test_record_poll_tracks_gaps() {
        let mut state = PollingState::new("nfl", 5);
        let t0 = Timestamp::from_millis(1_000);

        state.record_poll(t0);
        assert!(state.history().is_empty());

        state.record_poll(t0 + Duration::from_secs(30));
        state.record_poll(t0 + Duration::from_secs(90));
        assert_eq!(state.history().cadence(), Some(Duration::from_secs(45)));
        assert_eq!(state.last_poll(), Some(t0 + Duration::from_secs(90)));
    }

    #[test]
    fn test_bind_resets_on_feed_change() {
        let mut state = PollingState::new("nfl:scoreboard", 5);
        let now = Timestamp::from_millis(5_000);
        state.record_poll(now);
        state.apply(now, "g1:0:0".into(), Snapshots::from([("g1".into(), "g1:0:0".into())]));

        assert!(!state.bind("nfl:scoreboard"));
        assert!(state.snapshots().is_some());

        assert!(state.bind("nba:scoreboard"));
        assert_eq!(state.feed(), "nba:scoreboard");
        assert!(state.snapshots().is_none());
        assert_eq!(state.last_applied(), None);
        assert_eq!(state.last_poll(), None);
        assert_eq!(state.last_change_signature(), "");
    }
}
