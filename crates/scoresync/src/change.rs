//! Change detection
//!
//! Two levels: [`has_changed`] compares whole payloads structurally, and
//! [`diff_entities`] compares per-entity signatures against the last applied
//! snapshot so consumers know exactly which games moved.

use serde::Serialize;
use std::collections::HashMap;

/// Lifecycle phase of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started yet
    #[default]
    Scheduled,
    /// Currently being played
    InProgress,
    /// Finished
    Final,
}

impl Phase {
    /// Whether the entity is live
    pub fn is_live(&self) -> bool {
        matches!(self, Phase::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Scheduled => "scheduled",
            Phase::InProgress => "in_progress",
            Phase::Final => "final",
        }
    }
}

/// An item of a feed whose display-relevant fields can be fingerprinted
pub trait Entity {
    /// Stable identity across polls
    fn entity_id(&self) -> String;

    /// Composite of the fields whose change should surface to consumers
    ///
    /// Fields left out are never reported as changes.
    fn signature(&self) -> String;

    fn phase(&self) -> Phase;
}

/// Entity id to signature, as of one applied update
pub type Snapshots = HashMap<String, String>;

/// Result of comparing a fetched feed with the last applied one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDiff {
    /// No snapshot was applied before; nothing was compared
    pub initial: bool,
    /// Ids present in both with a different signature
    pub changed: Vec<String>,
    /// Ids only in the new feed
    pub added: Vec<String>,
    /// Ids only in the last applied feed
    pub removed: Vec<String>,
}

impl EntityDiff {
    /// Diff for a feed seen for the first time
    pub fn initial() -> Self {
        Self {
            initial: true,
            ..Default::default()
        }
    }

    /// Whether any entity was changed, added or removed
    pub fn has_changes(&self) -> bool {
        !(self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty())
    }

    /// Whether the update carries anything to apply
    pub fn is_applicable(&self) -> bool {
        self.initial || self.has_changes()
    }

    /// Total number of entities affected
    pub fn len(&self) -> usize {
        self.changed.len() + self.added.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Structural change check between two optional payloads
///
/// Identical references and two absent values are unchanged; one absent
/// side is a change. Otherwise the serialized JSON trees are compared, so
/// key order and allocation identity don't matter. If either side fails to
/// serialize, distinct references count as changed.
pub fn has_changed<T: Serialize + ?Sized>(previous: Option<&T>, next: Option<&T>) -> bool {
    match (previous, next) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(prev), Some(next)) => {
            if std::ptr::eq(prev, next) {
                return false;
            }
            match (serde_json::to_value(prev), serde_json::to_value(next)) {
                (Ok(a), Ok(b)) => a != b,
                _ => true,
            }
        }
    }
}

/// Signatures of `entities`, keyed by entity id
pub fn snapshot<E: Entity>(entities: &[E]) -> Snapshots {
    entities
        .iter()
        .map(|e| (e.entity_id(), e.signature()))
        .collect()
}

/// Compare `next` against the last applied snapshots
///
/// `last_applied` is `None` before the first applied update, which yields
/// an initial diff with no per-entity detail. Id lists are sorted.
pub fn diff_entities<E: Entity>(last_applied: Option<&Snapshots>, next: &[E]) -> EntityDiff {
    diff_snapshots(last_applied, &snapshot(next))
}

/// [`diff_entities`] over precomputed snapshots
pub fn diff_snapshots(last_applied: Option<&Snapshots>, next: &Snapshots) -> EntityDiff {
    let Some(previous) = last_applied else {
        return EntityDiff::initial();
    };

    let mut diff = EntityDiff::default();
    for (id, signature) in next {
        match previous.get(id) {
            Some(old) if old != signature => diff.changed.push(id.clone()),
            Some(_) => {}
            None => diff.added.push(id.clone()),
        }
    }
    diff.removed = previous
        .keys()
        .filter(|id| !next.contains_key(*id))
        .cloned()
        .collect();

    diff.changed.sort();
    diff.added.sort();
    diff.removed.sort();
    diff
}

/// Order-independent signature of a whole feed
pub fn feed_signature<E: Entity>(entities: &[E]) -> String {
    let mut signatures: Vec<String> = entities.iter().map(Entity::signature).collect();
    signatures.sort_unstable();
    signatures.join("|")
}

/// Whether any entity is live
pub fn any_live<E: Entity>(entities: &[E]) -> bool {
    entities.iter().any(|e| e.phase().is_live())
}
