//! Transition-schema resolution (§4.1 `resolve-schema`, `state-schema`):
//! turning a transition's declared `schema` field — inline, a dynamic
//! key, or absent — into a concrete JSON Schema document, and combining
//! a state's outgoing transitions into one discriminated schema to hand
//! to a schema-producing action.

use claij_domain::{Context, Machine, SchemaRef, State, Transition, TransitionId};
use serde_json::Value;

/// Which side of an action a fallback schema lookup is for, when a
/// transition declares no schema of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Resolve `transition`'s declared schema to a concrete document.
///
/// - An inline schema is returned as-is.
/// - A string key is looked up in `context.schema_resolvers` and the
///   resolver invoked with `(context, transition)`; an unregistered key
///   logs a warning and falls back to "any".
/// - Absent, with a `(state, direction)` fallback supplied, falls back
///   to the named action's declared input/output schema; absent with no
///   fallback, or an action the context doesn't know about, is "any".
pub fn resolve_schema(
    context: &Context,
    transition: &Transition,
    raw: Option<&SchemaRef>,
    state_direction: Option<(&State, Direction)>,
) -> Value {
    match raw {
        Some(SchemaRef::Inline(v)) => v.clone(),
        Some(SchemaRef::Key(key)) => match context.schema_resolvers.get(key) {
            Some(resolver) => resolver(context, transition),
            None => {
                tracing::warn!(key, transition = %transition.id, "unregistered dynamic schema key, falling back to any");
                Value::Bool(true)
            }
        },
        None => state_direction
            .and_then(|(state, direction)| action_schema(context, state, direction))
            .unwrap_or(Value::Bool(true)),
    }
}

fn action_schema(context: &Context, state: &State, direction: Direction) -> Option<Value> {
    let action_name = state.action.as_ref()?;
    let factory = context.actions.get(action_name)?;
    let desc = factory.descriptor();
    Some(match direction {
        Direction::Input => desc.input_schema.clone(),
        Direction::Output => desc.output_schema.clone(),
    })
}

/// Constrain a resolved alternative so its `id` is pinned to this
/// transition's `[from, to]` pair, guaranteeing the schema actually
/// discriminates even when the author's own schema says nothing about
/// `id`.
fn with_id_const(resolved: Value, id: &TransitionId) -> Value {
    serde_json::json!({
        "allOf": [
            resolved,
            {
                "type": "object",
                "properties": { "id": { "const": [id.from(), id.to()] } },
                "required": ["id"]
            }
        ]
    })
}

/// Combine `outgoing`'s resolved schemas into the one schema a
/// schema-producing action (C6) must satisfy: a single schema if there
/// is exactly one live transition, a `oneOf` discriminated union if
/// there are several, or the `false` schema (nothing validates) for a
/// terminal state with no outgoing transitions at all.
pub fn state_schema(context: &Context, state: &State, outgoing: &[&Transition]) -> Value {
    let alternatives: Vec<Value> = outgoing
        .iter()
        .map(|t| {
            let resolved = resolve_schema(context, t, t.schema.as_ref(), Some((state, Direction::Output)));
            with_id_const(resolved, &t.id)
        })
        .collect();

    match alternatives.len() {
        0 => Value::Bool(false),
        1 => alternatives.into_iter().next().unwrap(),
        _ => serde_json::json!({ "oneOf": alternatives }),
    }
}

/// Convenience wrapper that looks up `state`'s outgoing transitions on
/// `machine` directly.
pub fn state_schema_for(context: &Context, machine: &Machine, state: &State) -> Value {
    let outgoing: Vec<&Transition> = machine.outgoing(&state.id).collect();
    state_schema(context, state, &outgoing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claij_domain::{Action, ActionDescriptor, ActionFactory, BoxedAction, Continuation, Event, EngineConfig};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct StubFactory(ActionDescriptor);
    #[async_trait::async_trait]
    impl Action for StubAction {
        async fn run(&self, _c: Context, _e: Event, _t: claij_domain::Trail, _cont: Arc<dyn Continuation>) {}
    }
    struct StubAction;
    impl ActionFactory for StubFactory {
        fn descriptor(&self) -> &ActionDescriptor {
            &self.0
        }
        fn build(&self, _c: &Value, _m: &Machine, _s: &State) -> claij_domain::Result<BoxedAction> {
            Ok(Arc::new(StubAction))
        }
    }

    fn ctx_with_action(name: &str, output_schema: Value) -> Context {
        let mut actions: HashMap<String, claij_domain::BoxedActionFactory> = HashMap::new();
        let desc = ActionDescriptor::new(name).with_output_schema(output_schema);
        actions.insert(name.to_string(), Arc::new(StubFactory(desc)));
        Context::new(actions, EngineConfig::default())
    }

    #[test]
    fn inline_schema_passes_through() {
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let t = Transition::new("a", "b");
        let raw = SchemaRef::Inline(serde_json::json!({"type": "integer"}));
        let resolved = resolve_schema(&ctx, &t, Some(&raw), None);
        assert_eq!(resolved, serde_json::json!({"type": "integer"}));
    }

    #[test]
    fn unregistered_key_falls_back_to_any() {
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let t = Transition::new("a", "b");
        let raw = SchemaRef::Key("missing".into());
        let resolved = resolve_schema(&ctx, &t, Some(&raw), None);
        assert_eq!(resolved, Value::Bool(true));
    }

    #[test]
    fn absent_falls_back_to_action_output_schema() {
        let ctx = ctx_with_action("llm", serde_json::json!({"type": "object"}));
        let mut state = State::new("s");
        state.action = Some("llm".into());
        let t = Transition::new("s", "end");
        let resolved = resolve_schema(&ctx, &t, None, Some((&state, Direction::Output)));
        assert_eq!(resolved, serde_json::json!({"type": "object"}));
    }

    #[test]
    fn no_outgoing_transitions_yields_false_schema() {
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let state = State::new("terminal");
        assert_eq!(state_schema(&ctx, &state, &[]), Value::Bool(false));
    }

    #[test]
    fn single_outgoing_pins_id_const() {
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let state = State::new("s");
        let t = Transition::new("s", "end");
        let schema = state_schema(&ctx, &state, &[&t]);
        let all_of = schema.get("allOf").unwrap().as_array().unwrap();
        assert_eq!(all_of.len(), 2);
    }

    #[test]
    fn multiple_outgoing_yields_one_of() {
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let state = State::new("s");
        let t1 = Transition::new("s", "a");
        let t2 = Transition::new("s", "b");
        let schema = state_schema(&ctx, &state, &[&t1, &t2]);
        assert!(schema.get("oneOf").unwrap().as_array().unwrap().len() == 2);
    }
}
