//! The machine document: states, transitions, and the schemas/prompts
//! attached to them. Machines are immutable reference data, shared
//! read-only across every running instance.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The synthetic source state every machine starts from.
pub const START: &str = "start";
/// The synthetic sink state every machine ends at.
pub const END: &str = "end";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TransitionId — the `[from, to]` discriminator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `"id": [from, to]` pair that makes an event route unambiguously.
///
/// Serializes as a two-element JSON array, matching the wire shape used
/// by both transitions and events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub String, pub String);

impl TransitionId {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self(from.into(), to.into())
    }

    pub fn from(&self) -> &str {
        &self.0
    }

    pub fn to(&self) -> &str {
        &self.1
    }

    /// The `[from, "end"]` bail-out target for a given state.
    pub fn bail_out_from(state: &str) -> Self {
        Self::new(state, END)
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.0, self.1)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hat declarations (C8)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A reusable fragment (states + transitions + prompts) spliced into a
/// state before the machine starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatDecl {
    pub hat: String,
    #[serde(default)]
    pub config: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct State {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Key resolving to an action factory in the context. Absent means
    /// "no-op" — used for `"start"`.
    #[serde(default)]
    pub action: Option<String>,
    /// Opaque value validated against the action's config-schema at
    /// machine start.
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub hats: Vec<HatDecl>,
}

impl State {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            action: None,
            config: None,
            prompts: Vec::new(),
            hats: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition schema reference: inline document, dynamic key, or absent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A transition's declared schema: an inline JSON Schema document, a
/// string key naming a dynamic resolver in the context, or absent
/// (meaning "any", or a fallback to the action's declared schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaRef {
    Key(String),
    Inline(Value),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transition {
    pub id: TransitionId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub schema: Option<SchemaRef>,
    /// If true, events crossing this transition are not appended to the
    /// trail.
    #[serde(default)]
    pub omit: bool,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: TransitionId::new(from, to),
            label: None,
            description: None,
            prompts: Vec::new(),
            schema: None,
            omit: false,
        }
    }

    pub fn from(&self) -> &str {
        self.id.from()
    }

    pub fn to(&self) -> &str {
        self.id.to()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Registry of named schema fragments, used as `$defs` for `$ref`
    /// resolution.
    #[serde(default)]
    pub schemas: HashMap<String, Value>,
    /// A single machine-wide schema fragment, merged into `schemas` under
    /// no particular name; rarely used directly by transitions.
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub hats: Vec<HatDecl>,
    pub states: Vec<State>,
    #[serde(rename = "xitions")]
    pub transitions: Vec<Transition>,
}

impl Machine {
    pub fn state(&self, id: &str) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn transition(&self, id: &TransitionId) -> Option<&Transition> {
        self.transitions.iter().find(|t| &t.id == id)
    }

    pub fn outgoing(&self, state_id: &str) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.from() == state_id)
    }

    pub fn incoming(&self, state_id: &str) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.to() == state_id)
    }

    /// Checks the machine invariants from §3: unique `start`/`end`
    /// synthetic states, every transition endpoint names an existing
    /// state, `start` has no inbound/`end` has no outbound transitions,
    /// and at least one transition touches each.
    pub fn validate_shape(&self) -> Result<(), String> {
        let starts = self.states.iter().filter(|s| s.id == START).count();
        let ends = self.states.iter().filter(|s| s.id == END).count();
        if starts != 1 {
            return Err(format!("machine must have exactly one '{START}' state, found {starts}"));
        }
        if ends != 1 {
            return Err(format!("machine must have exactly one '{END}' state, found {ends}"));
        }

        let mut seen_ids = std::collections::HashSet::new();
        for s in &self.states {
            if !seen_ids.insert(s.id.as_str()) {
                return Err(format!("duplicate state id: {}", s.id));
            }
        }

        let mut seen_xitions = std::collections::HashSet::new();
        for t in &self.transitions {
            if !seen_xitions.insert(&t.id) {
                return Err(format!("duplicate transition id: {}", t.id));
            }
            if self.state(t.from()).is_none() {
                return Err(format!("transition {} references unknown from-state", t.id));
            }
            if self.state(t.to()).is_none() {
                return Err(format!("transition {} references unknown to-state", t.id));
            }
            if t.from() == START && t.to() != START {
                // ok, outgoing from start is allowed.
            }
        }

        if self.incoming(START).next().is_some() {
            return Err(format!("'{START}' must have no inbound transitions"));
        }
        if self.outgoing(END).next().is_some() {
            return Err(format!("'{END}' must have no outbound transitions"));
        }
        if self.outgoing(START).next().is_none() {
            return Err(format!("machine must have at least one transition from '{START}'"));
        }
        if self.incoming(END).next().is_none() {
            return Err(format!("machine must have at least one transition to '{END}'"));
        }

        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An in-flight document. Always a JSON object carrying at minimum
/// `"id": [from, to]`; additional fields are domain-specific.
pub type Event = Value;

/// The sentinel id an action emits on an unrecoverable transport error.
pub const ERROR_ID: &str = "error";

/// What an event's `"id"` field actually names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventId {
    /// A well-formed `[from, to]` discriminator.
    Transition(TransitionId),
    /// The `"error"` sentinel — bail out immediately, no retry.
    Error,
    /// Anything else: malformed or naming a transition that does not
    /// exist on this machine.
    Other(Value),
}

/// Extract the discriminator from an event's `"id"` field.
pub fn event_id(event: &Event) -> EventId {
    match event.get("id") {
        Some(Value::String(s)) if s == ERROR_ID => EventId::Error,
        Some(Value::Array(arr)) if arr.len() == 2 => {
            match (arr[0].as_str(), arr[1].as_str()) {
                (Some(from), Some(to)) => EventId::Transition(TransitionId::new(from, to)),
                _ => EventId::Other(Value::Array(arr.clone())),
            }
        }
        Some(other) => EventId::Other(other.clone()),
        None => EventId::Other(Value::Null),
    }
}

/// Build an event object stamped with the given transition id.
pub fn make_event(id: TransitionId, mut fields: Value) -> Event {
    let id_value = serde_json::json!([id.0, id.1]);
    match &mut fields {
        Value::Object(map) => {
            map.insert("id".to_string(), id_value);
            fields
        }
        _ => serde_json::json!({ "id": id_value }),
    }
}

/// Build the `{"id": "error", "error": ...}` sentinel event.
pub fn make_error_event(error: Value) -> Event {
    serde_json::json!({ "id": ERROR_ID, "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn increment_machine() -> Machine {
        Machine {
            id: "increment".into(),
            description: None,
            version: None,
            schemas: HashMap::new(),
            schema: None,
            prompts: Vec::new(),
            hats: Vec::new(),
            states: vec![State::new(START), State::new("p"), State::new(END)],
            transitions: vec![
                Transition::new(START, "p"),
                Transition::new("p", END),
            ],
        }
    }

    #[test]
    fn valid_shape_passes() {
        increment_machine().validate_shape().unwrap();
    }

    #[test]
    fn missing_end_fails() {
        let mut m = increment_machine();
        m.states.retain(|s| s.id != END);
        m.transitions.retain(|t| t.to() != END);
        assert!(m.validate_shape().is_err());
    }

    #[test]
    fn inbound_to_start_fails() {
        let mut m = increment_machine();
        m.transitions.push(Transition::new("p", START));
        assert!(m.validate_shape().is_err());
    }

    #[test]
    fn outbound_from_end_fails() {
        let mut m = increment_machine();
        m.transitions.push(Transition::new(END, "p"));
        assert!(m.validate_shape().is_err());
    }

    #[test]
    fn event_id_recognizes_transition() {
        let e = make_event(TransitionId::new("a", "b"), serde_json::json!({"value": 1}));
        assert_eq!(event_id(&e), EventId::Transition(TransitionId::new("a", "b")));
    }

    #[test]
    fn event_id_recognizes_error_sentinel() {
        let e = make_error_event(serde_json::json!({"reason": "boom"}));
        assert_eq!(event_id(&e), EventId::Error);
    }

    #[test]
    fn event_id_other_for_unknown_shape() {
        let e = serde_json::json!({"id": "bogus"});
        assert_eq!(event_id(&e), EventId::Other(Value::String("bogus".into())));
    }

    #[test]
    fn transition_id_display() {
        let id = TransitionId::new("a", "b");
        assert_eq!(format!("{id}"), "[a, b]");
    }
}
