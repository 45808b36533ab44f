//! Change notifications keyed by resource

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, trace};

use scoresync_core::{Result, SyncError, Timestamp};

const DEFAULT_CAPACITY: usize = 16;

/// A confirmed change to one resource
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    pub data: Arc<Value>,
    pub updated_at: Timestamp,
}

impl ChangeEvent {
    /// Decode the payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(self.data.as_ref()).map_err(|e| SyncError::Deserialization(e.to_string()))
    }
}

/// Receiving end for one resource's changes
///
/// Dropping the last subscription for a key releases that key's channel and
/// its remembered value.
pub struct Subscription {
    key: String,
    rx: broadcast::Receiver<ChangeEvent>,
    channels: Arc<DashMap<String, Channel>>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next change, `None` once the notifier is gone
    ///
    /// A subscriber that fell behind skips to the oldest retained event.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(key = %self.key, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next change decoded as `T`
    pub async fn recv_as<T: DeserializeOwned>(&mut self) -> Option<Result<T>> {
        self.recv().await.map(|event| event.decode())
    }

    /// Next change if one is already queued
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // `rx` is still counted here
        self.channels
            .remove_if(&self.key, |_, channel| channel.tx.receiver_count() <= 1);
    }
}

struct Channel {
    tx: broadcast::Sender<ChangeEvent>,
    /// Last value sent to subscribers
    applied: Option<Arc<Value>>,
}

/// Fans out changes to subscribers of each resource
///
/// Only keys with live subscribers are tracked. For those it remembers the
/// last value published and stays silent when a new value is structurally
/// equal to it. Cloning creates a new handle to the SAME channels.
#[derive(Clone)]
pub struct ChangeNotifier {
    channels: Arc<DashMap<String, Channel>>,
    capacity: usize,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Buffer up to `capacity` events per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Listen for changes to `key`
    pub fn subscribe(&self, key: &str) -> Subscription {
        let rx = self
            .channels
            .entry(key.to_string())
            .or_insert_with(|| Channel {
                tx: broadcast::channel(self.capacity).0,
                applied: None,
            })
            .tx
            .subscribe();
        Subscription {
            key: key.to_string(),
            rx,
            channels: self.channels.clone(),
        }
    }

    /// Whether `key` has subscribers but nothing to compare against yet
    pub fn needs_baseline(&self, key: &str) -> bool {
        self.channels
            .get(key)
            .is_some_and(|channel| channel.applied.is_none())
    }

    /// Set the value later updates of `key` are compared against
    ///
    /// Ignored once a value has been published or when nobody listens.
    pub fn seed(&self, key: &str, data: Value) {
        if let Some(mut channel) = self.channels.get_mut(key) {
            if channel.applied.is_none() {
                channel.applied = Some(Arc::new(data));
            }
        }
    }

    /// Record `data` as the latest value of `key`, notifying on change
    ///
    /// Returns `true` if subscribers were sent a change. Keys nobody listens
    /// to are not tracked.
    pub fn publish_if_changed(&self, key: &str, data: Value, updated_at: Timestamp) -> bool {
        let Some(mut channel) = self.channels.get_mut(key) else {
            return false;
        };
        if channel.tx.receiver_count() == 0 {
            drop(channel);
            self.channels
                .remove_if(key, |_, channel| channel.tx.receiver_count() == 0);
            trace!(key = %key, "no subscribers left, channel released");
            return false;
        }
        if channel.applied.as_deref() == Some(&data) {
            trace!(key = %key, "value unchanged, not notifying");
            return false;
        }

        let data = Arc::new(data);
        channel.applied = Some(data.clone());
        let tx = channel.tx.clone();
        drop(channel);

        let event = ChangeEvent {
            key: key.to_string(),
            data,
            updated_at,
        };
        // Receivers may have gone since the check
        let _ = tx.send(event);
        true
    }

    /// Last value published for `key`
    pub fn last_published(&self, key: &str) -> Option<Arc<Value>> {
        self.channels.get(key).and_then(|channel| channel.applied.clone())
    }

    /// Forget the last value for `key` so the next one always notifies
    pub fn forget(&self, key: &str) {
        if let Some(mut channel) = self.channels.get_mut(key) {
            channel.applied = None;
        }
    }

    /// Live subscribers for `key`
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.channels
            .get(key)
            .map_or(0, |channel| channel.tx.receiver_count())
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscriber_gets_changes_only() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe("nfl:scoreboard");
        let t = Timestamp::from_millis(1);

        assert!(notifier.publish_if_changed("nfl:scoreboard", json!({"g1": "0-0"}), t));
        assert!(!notifier.publish_if_changed("nfl:scoreboard", json!({"g1": "0-0"}), t));
        assert!(notifier.publish_if_changed("nfl:scoreboard", json!({"g1": "7-0"}), t));

        let first = sub.recv().await.unwrap();
        assert_eq!(*first.data, json!({"g1": "0-0"}));
        let second = sub.recv().await.unwrap();
        assert_eq!(*second.data, json!({"g1": "7-0"}));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let notifier = ChangeNotifier::new();
        let mut nba = notifier.subscribe("nba");
        let t = Timestamp::from_millis(1);

        notifier.publish_if_changed("nhl", json!(1), t);
        assert!(nba.try_recv().is_none());

        notifier.publish_if_changed("nba", json!(1), t);
        assert_eq!(nba.try_recv().unwrap().key, "nba");
    }

    #[tokio::test]
    async fn test_recv_as_decodes() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe("k");
        notifier.publish_if_changed("k", json!([1, 2, 3]), Timestamp::from_millis(1));

        let decoded: Vec<u32> = sub.recv_as().await.unwrap().unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn test_forget_and_last_published() {
        let notifier = ChangeNotifier::new();
        let _sub = notifier.subscribe("k");
        let t = Timestamp::from_millis(1);
        notifier.publish_if_changed("k", json!("a"), t);
        assert_eq!(notifier.last_published("k").as_deref(), Some(&json!("a")));

        notifier.forget("k");
        assert!(notifier.last_published("k").is_none());
        assert!(notifier.publish_if_changed("k", json!("a"), t));
    }

    #[test]
    fn test_unsubscribed_keys_are_not_tracked() {
        let notifier = ChangeNotifier::new();
        let t = Timestamp::from_millis(1);
        for i in 0..100 {
            assert!(!notifier.publish_if_changed(&format!("k{i}"), json!(i), t));
        }
        assert_eq!(notifier.tracked_keys(), 0);

        let sub = notifier.subscribe("k0");
        notifier.publish_if_changed("k0", json!(0), t);
        assert_eq!(notifier.tracked_keys(), 1);
        drop(sub);
        assert_eq!(notifier.tracked_keys(), 0);
        assert!(notifier.last_published("k0").is_none());
    }

    #[test]
    fn test_seed_suppresses_unchanged_value() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe("k");
        assert!(notifier.needs_baseline("k"));
        notifier.seed("k", json!({"g1": "7-0"}));
        assert!(!notifier.needs_baseline("k"));

        let t = Timestamp::from_millis(1);
        assert!(!notifier.publish_if_changed("k", json!({"g1": "7-0"}), t));
        assert!(sub.try_recv().is_none());
        assert!(notifier.publish_if_changed("k", json!({"g1": "7-3"}), t));
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn test_subscriber_count() {
        let notifier = ChangeNotifier::new();
        assert_eq!(notifier.subscriber_count("k"), 0);
        let a = notifier.subscribe("k");
        let b = notifier.subscribe("k");
        assert_eq!(notifier.subscriber_count("k"), 2);
        drop(a);
        assert_eq!(notifier.subscriber_count("k"), 1);
        drop(b);
        assert_eq!(notifier.subscriber_count("k"), 0);
        assert_eq!(notifier.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let notifier = ChangeNotifier::with_capacity(2);
        let mut sub = notifier.subscribe("k");
        for i in 0..5 {
            notifier.publish_if_changed("k", json!(i), Timestamp::from_millis(i));
        }
        let event = sub.recv().await.unwrap();
        assert_eq!(*event.data, json!(3));
    }
}
