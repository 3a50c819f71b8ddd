//! The append-only per-run audit log (C5). Actions consult it to
//! reconstruct history; the dispatcher is the only writer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::machine::Event;

/// One recorded hop: a successful transition, or a retry attempt that
/// carries an `error` instead of (or alongside) a take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailEntry {
    pub from: String,
    pub to: String,
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl TrailEntry {
    pub fn taken(from: impl Into<String>, to: impl Into<String>, event: Event) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            event,
            error: None,
        }
    }

    pub fn retry(from: impl Into<String>, to: impl Into<String>, event: Event, error: Value) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            event,
            error: Some(error),
        }
    }
}

/// Ordered history of transitions taken (and retry attempts recorded)
/// for one run. Copy-on-append: pushing returns a new `Trail` sharing no
/// mutable state with the original, so it is safe to hand to concurrent
/// tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trail(Vec<TrailEntry>);

impl Trail {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn entries(&self) -> &[TrailEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new trail with `entry` appended.
    pub fn pushed(&self, entry: TrailEntry) -> Self {
        let mut entries = self.0.clone();
        entries.push(entry);
        Self(entries)
    }

    /// The event carried by the most recent entry, if any.
    pub fn last_event(&self) -> Option<&Event> {
        self.0.last().map(|e| &e.event)
    }

    pub fn last(&self) -> Option<&TrailEntry> {
        self.0.last()
    }
}

impl From<Vec<TrailEntry>> for Trail {
    fn from(entries: Vec<TrailEntry>) -> Self {
        Self(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_does_not_mutate_original() {
        let t0 = Trail::new();
        let t1 = t0.pushed(TrailEntry::taken("start", "p", serde_json::json!({"id": ["start","p"]})));
        assert_eq!(t0.len(), 0);
        assert_eq!(t1.len(), 1);
    }

    #[test]
    fn last_event_reflects_most_recent_push() {
        let t = Trail::new()
            .pushed(TrailEntry::taken("start", "p", serde_json::json!({"id": ["start","p"], "n": 1})))
            .pushed(TrailEntry::taken("p", "end", serde_json::json!({"id": ["p","end"], "n": 2})));
        assert_eq!(t.last_event().unwrap()["n"], 2);
    }

    #[test]
    fn retry_entry_carries_error() {
        let e = TrailEntry::retry("p", "end", serde_json::json!({"id":["p","end"]}), serde_json::json!("bad shape"));
        assert!(e.error.is_some());
    }
}
