//! Adaptive polling schedule
//!
//! Poll fast while anything is live, slowly otherwise, and back off further
//! while nobody is looking.

use std::time::Duration;

use scoresync_core::Timestamp;

use crate::change::Phase;

/// Whether the consumer is currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Polling regime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing live; poll slowly
    Dormant,
    /// At least one entity in progress
    Active,
    /// Consumer hidden; stretched interval
    Backgrounded,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Dormant => "dormant",
            SchedulerState::Active => "active",
            SchedulerState::Backgrounded => "backgrounded",
        }
    }
}

/// Polling intervals and debounce settings
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Interval while any entity is live
    pub active_interval: Duration,
    /// Interval while nothing is live
    pub dormant_interval: Duration,
    /// Multiplier applied while hidden
    pub background_factor: u32,
    /// Floor for the hidden interval
    pub min_background_interval: Duration,
    /// Updates closer than this to the last applied one are dropped
    pub debounce_window: Duration,
    /// Poll gaps kept for cadence tracking
    pub history_len: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_secs(30),
            dormant_interval: Duration::from_secs(300),
            background_factor: 2,
            min_background_interval: Duration::from_secs(60),
            debounce_window: Duration::from_secs(1),
            history_len: 10,
        }
    }
}

impl ScheduleConfig {
    /// Set both base intervals
    pub fn intervals(mut self, active: Duration, dormant: Duration) -> Self {
        self.active_interval = active;
        self.dormant_interval = dormant;
        self
    }

    /// Set the debounce window
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Set background backoff
    pub fn background(mut self, factor: u32, min_interval: Duration) -> Self {
        self.background_factor = factor;
        self.min_background_interval = min_interval;
        self
    }
}

/// Computes polling intervals from entity phases and visibility
#[derive(Debug, Clone, Default)]
pub struct PollScheduler {
    config: ScheduleConfig,
}

impl PollScheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Current regime for a feed with the given phases
    pub fn state<I>(&self, phases: I, visibility: Visibility) -> SchedulerState
    where
        I: IntoIterator<Item = Phase>,
    {
        if visibility == Visibility::Hidden {
            return SchedulerState::Backgrounded;
        }
        if phases.into_iter().any(|p| p.is_live()) {
            SchedulerState::Active
        } else {
            SchedulerState::Dormant
        }
    }

    /// Delay before the next poll
    pub fn next_interval<I>(&self, phases: I, visibility: Visibility) -> Duration
    where
        I: IntoIterator<Item = Phase>,
    {
        let live = phases.into_iter().any(|p| p.is_live());
        self.interval_for(live, visibility)
    }

    /// Delay for a feed that is or isn't live
    pub fn interval_for(&self, live: bool, visibility: Visibility) -> Duration {
        let base = if live {
            self.config.active_interval
        } else {
            self.config.dormant_interval
        };

        match visibility {
            Visibility::Visible => base,
            Visibility::Hidden => base
                .saturating_mul(self.config.background_factor.max(1))
                .max(self.config.min_background_interval),
        }
    }

    /// Whether an update at `now` falls outside the debounce window
    pub fn should_apply(&self, last_applied: Option<Timestamp>, now: Timestamp) -> bool {
        match last_applied {
            Some(at) => now.saturating_since(at) >= self.config.debounce_window,
            None => true,
        }
    }
}

/// Exponential backoff for failed polls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Retries before falling back to the regular schedule
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Never retry early
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether retry number `attempt` (0-based) is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: [Phase; 2] = [Phase::Final, Phase::InProgress];
    const QUIET: [Phase; 2] = [Phase::Final, Phase::Scheduled];

    #[test]
    fn test_state_transitions() {
        let scheduler = PollScheduler::default();
        assert_eq!(scheduler.state(QUIET, Visibility::Visible), SchedulerState::Dormant);
        assert_eq!(scheduler.state(LIVE, Visibility::Visible), SchedulerState::Active);
        assert_eq!(scheduler.state(LIVE, Visibility::Hidden), SchedulerState::Backgrounded);
        assert_eq!(scheduler.state(std::iter::empty(), Visibility::Visible), SchedulerState::Dormant);
    }

    #[test]
    fn test_default_intervals() {
        let scheduler = PollScheduler::default();
        assert_eq!(scheduler.next_interval(LIVE, Visibility::Visible), Duration::from_secs(30));
        assert_eq!(scheduler.next_interval(QUIET, Visibility::Visible), Duration::from_secs(300));
        assert_eq!(scheduler.next_interval(LIVE, Visibility::Hidden), Duration::from_secs(60));
        assert_eq!(scheduler.next_interval(QUIET, Visibility::Hidden), Duration::from_secs(600));
    }

    #[test]
    fn test_background_floor() {
        let scheduler = PollScheduler::new(
            ScheduleConfig::default().intervals(Duration::from_secs(5), Duration::from_secs(20)),
        );
        assert_eq!(scheduler.interval_for(true, Visibility::Hidden), Duration::from_secs(60));
        assert_eq!(scheduler.interval_for(false, Visibility::Hidden), Duration::from_secs(60));

        // At least doubles whatever the base is
        for live in [true, false] {
            let visible = scheduler.interval_for(live, Visibility::Visible);
            assert!(scheduler.interval_for(live, Visibility::Hidden) >= visible * 2);
        }
    }

    #[test]
    fn test_debounce_window() {
        let scheduler = PollScheduler::default();
        let t0 = Timestamp::from_millis(10_000);

        assert!(scheduler.should_apply(None, t0));
        assert!(!scheduler.should_apply(Some(t0), t0 + Duration::from_millis(200)));
        assert!(scheduler.should_apply(Some(t0), t0 + Duration::from_millis(1_200)));
        assert!(scheduler.should_apply(Some(t0), t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for(2), Duration::from_secs(4));
        assert_eq!(retry.delay_for(10), Duration::from_secs(30));
        assert_eq!(retry.delay_for(64), Duration::from_secs(30));

        assert!(retry.should_retry(2));
        assert!(!retry.should_retry(3));
        assert!(!RetryPolicy::disabled().should_retry(0));
    }
}
