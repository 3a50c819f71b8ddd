//! `trail->prompts` (C5, consumed by C6): turn a recorded history into
//! a language-model conversation. Lives alongside schema resolution
//! rather than in the engine crate proper so the LLM action can build
//! prompts without depending on the runtime/dispatcher.

use claij_domain::{Context, Event, Machine, State, Trail, TrailEntry, TransitionId};
use serde::Serialize;
use serde_json::Value;

use crate::resolve::{resolve_schema, state_schema_for, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub role: Role,
    pub content: Value,
}

impl Prompt {
    pub fn system(content: impl Into<Value>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// The source state's action name that marks an entry as the model's
/// own turn rather than the caller's.
const ASSISTANT_ACTION: &str = "llm";

fn is_assistant_entry(machine: &Machine, from: &str) -> bool {
    machine
        .state(from)
        .and_then(|s| s.action.as_deref())
        .map(|action| action == ASSISTANT_ACTION)
        .unwrap_or(false)
}

fn entry_to_prompt(context: &Context, machine: &Machine, entry: &TrailEntry) -> Prompt {
    if is_assistant_entry(machine, &entry.from) {
        return Prompt {
            role: Role::Assistant,
            content: entry.event.clone(),
        };
    }

    let input_schema = machine
        .transition(&TransitionId::new(entry.from.clone(), entry.to.clone()))
        .map(|t| {
            let from_state = machine.state(&entry.from);
            resolve_schema(context, t, t.schema.as_ref(), from_state.map(|s| (s, Direction::Output)))
        })
        .unwrap_or(Value::Bool(true));

    let output_schema = machine
        .state(&entry.to)
        .map(|s| state_schema_for(context, machine, s))
        .unwrap_or(Value::Bool(true));

    Prompt {
        role: Role::User,
        content: serde_json::json!([input_schema, entry.event, output_schema]),
    }
}

/// Convert every recorded entry into one conversation message, in
/// order. The source state's action name decides the role: `"llm"`
/// means the model said it (an assistant turn, content = the event
/// alone); anything else is a user turn carrying `[input-schema,
/// event, output-schema]`.
pub fn trail_to_prompts(context: &Context, machine: &Machine, trail: &Trail) -> Vec<Prompt> {
    trail
        .entries()
        .iter()
        .map(|entry| entry_to_prompt(context, machine, entry))
        .collect()
}

/// Synthesize the initial user turn for an empty trail: `[input-schema,
/// event, output-schema]` where the output-schema is the current
/// state's `state-schema` over its outgoing transitions.
pub fn synthesize_initial_prompt(context: &Context, machine: &Machine, state: &State, event: &Event) -> Prompt {
    let output_schema = state_schema_for(context, machine, state);
    Prompt {
        role: Role::User,
        content: serde_json::json!([Value::Bool(true), event, output_schema]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claij_domain::{EngineConfig, State, Transition};
    use std::collections::HashMap;

    fn machine_with_llm_state() -> Machine {
        let mut llm_state = State::new("ask");
        llm_state.action = Some("llm".into());
        Machine {
            id: "m".into(),
            description: None,
            version: None,
            schemas: HashMap::new(),
            schema: None,
            prompts: Vec::new(),
            hats: Vec::new(),
            states: vec![State::new("start"), llm_state, State::new("end")],
            transitions: vec![Transition::new("start", "ask"), Transition::new("ask", "end")],
        }
    }

    #[test]
    fn assistant_turn_for_llm_source_state() {
        let machine = machine_with_llm_state();
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let trail = Trail::new().pushed(TrailEntry::taken("ask", "end", serde_json::json!({"id": ["ask","end"], "value": 1})));
        let prompts = trail_to_prompts(&ctx, &machine, &trail);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].role, Role::Assistant);
        assert_eq!(prompts[0].content, serde_json::json!({"id": ["ask","end"], "value": 1}));
    }

    #[test]
    fn user_turn_for_non_llm_source_state() {
        let machine = machine_with_llm_state();
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let trail = Trail::new().pushed(TrailEntry::taken("start", "ask", serde_json::json!({"id": ["start","ask"]})));
        let prompts = trail_to_prompts(&ctx, &machine, &trail);
        assert_eq!(prompts[0].role, Role::User);
        assert!(prompts[0].content.is_array());
    }
}
