//! The LLM action (C6) — the most intricate action in the engine:
//! resolve service/model, assemble the conversation, call out, parse the
//! reply with bounded retry, route tool calls to the MCP state.

use std::sync::Arc;

use claij_domain::{
    event_id, make_error_event, make_event, Action, ActionDescriptor, ActionFactory, BoxedAction,
    Context, Continuation, ContinuationExt, Event, Machine, Result, State, Trail, TransitionId,
};
use claij_schema::{expand_refs, state_schema_for, synthesize_initial_prompt, trail_to_prompts};
use serde_json::Value;
use tracing::Instrument;

use crate::parse::parse_structured_reply;
use crate::service::ServiceRegistry;
use crate::types::{ChatOptions, ChatRequest, Message};

/// The synthetic state a tool-call event is routed to.
pub const MCP_STATE: &str = "mcp";

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmActionConfig {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

pub struct LlmAction {
    machine: Arc<Machine>,
    state: Arc<State>,
    registry: Arc<ServiceRegistry>,
    config: LlmActionConfig,
}

fn resolve_str<'a>(
    from_config: Option<&'a str>,
    event: &'a Event,
    event_key: &str,
    from_context: Option<&'a str>,
) -> Option<String> {
    from_config
        .map(|s| s.to_string())
        .or_else(|| event.get(event_key).and_then(Value::as_str).map(|s| s.to_string()))
        .or_else(|| from_context.map(|s| s.to_string()))
}

fn system_prompt(machine: &Machine, state: &State, transition_prompts: &[String], defs: &Value) -> Message {
    let mut text = String::from(
        "You are driving a typed state machine. Reply with a single JSON object whose \"id\" \
         field is one of the enumerated [from, to] transition constants below. Do not wrap the \
         reply in commentary.",
    );
    for p in machine.prompts.iter().chain(transition_prompts).chain(&state.prompts) {
        text.push('\n');
        text.push_str(p);
    }
    Message::system(serde_json::json!({ "instructions": text, "defs": defs }))
}

impl LlmAction {
    fn resolve_service_and_model(&self, context: &Context, event: &Event) -> (Option<String>, Option<String>) {
        let service = resolve_str(
            self.config.service.as_deref(),
            event,
            "service",
            context.engine.default_llm_service.as_deref(),
        );
        let model = resolve_str(
            self.config.model.as_deref(),
            event,
            "model",
            context.engine.default_model.as_deref(),
        );
        (service, model)
    }

    fn incoming_transition_schema(&self, context: &Context, event: &Event) -> Value {
        match event_id(event) {
            claij_domain::EventId::Transition(id) if id.to() == self.state.id => self
                .machine
                .transition(&id)
                .map(|t| {
                    claij_schema::resolve_schema(context, t, t.schema.as_ref(), None)
                })
                .unwrap_or(Value::Bool(true)),
            _ => Value::Bool(true),
        }
    }

    fn transition_prompts(&self, event: &Event) -> Vec<String> {
        match event_id(event) {
            claij_domain::EventId::Transition(id) if id.to() == self.state.id => self
                .machine
                .transition(&id)
                .map(|t| t.prompts.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl Action for LlmAction {
    async fn run(&self, context: Context, event: Event, trail: Trail, cont: Arc<dyn Continuation>) {
        let span = tracing::info_span!(
            "llm.call",
            machine_id = %self.machine.id,
            state = %self.state.id,
        );
        async move {
            let (service_name, model) = self.resolve_service_and_model(&context, &event);
            let Some(service_name) = service_name else {
                cont.complete_simple(
                    context,
                    make_error_event(serde_json::json!({ "message": "no LLM service could be resolved" })),
                )
                .await;
                return;
            };
            let Some(service) = self.registry.get(&service_name) else {
                cont.complete_simple(
                    context,
                    make_error_event(serde_json::json!({
                        "message": format!("no LLM service registered under '{service_name}'")
                    })),
                )
                .await;
                return;
            };
            let model = model.unwrap_or_else(|| service_name.clone());

            let output_schema = state_schema_for(&context, &self.machine, &self.state);
            let output_schema = expand_refs(&output_schema, &context.defs);
            let input_schema = expand_refs(&self.incoming_transition_schema(&context, &event), &context.defs);
            let transition_prompts = self.transition_prompts(&event);

            let mut messages = vec![system_prompt(&self.machine, &self.state, &transition_prompts, &input_schema)];
            if trail.is_empty() {
                messages.push(synthesize_initial_prompt(&context, &self.machine, &self.state, &event).into());
            } else {
                messages.extend(trail_to_prompts(&context, &self.machine, &trail).into_iter().map(Into::into));
            }
            let mut parsed: Option<Value> = None;
            let mut attempt = 0u32;
            loop {
                let req = ChatRequest {
                    service: service_name.clone(),
                    model: model.clone(),
                    messages: messages.clone(),
                    options: ChatOptions {
                        schema: Some(output_schema.clone()),
                        max_retries: None,
                    },
                };
                let resp = match service.chat(req).instrument(tracing::info_span!("llm.chat", attempt)).await {
                    Ok(r) => r,
                    Err(e) => {
                        cont.complete_simple(
                            context,
                            make_error_event(serde_json::json!({ "message": e.to_string() })),
                        )
                        .await;
                        return;
                    }
                };

                if !resp.tool_calls.is_empty() {
                    let fields = serde_json::json!({ "tool_calls": resp.tool_calls });
                    let out = make_event(TransitionId::new(self.state.id.clone(), MCP_STATE), fields);
                    cont.complete_simple(context, out).await;
                    return;
                }

                match parse_structured_reply(&resp.content) {
                    Ok(v) => {
                        parsed = Some(v);
                        break;
                    }
                    Err(message) => {
                        attempt += 1;
                        if attempt > context.engine.max_parse_retries {
                            cont.complete_simple(
                                context,
                                make_error_event(serde_json::json!({ "message": message })),
                            )
                            .await;
                            return;
                        }
                        tracing::warn!(attempt, %message, "llm reply failed to parse, retrying with feedback");
                        messages.push(Message::assistant(resp.content.clone().into()));
                        messages.push(Message::user(serde_json::json!(format!(
                            "Your previous reply could not be parsed: {message}. Reply again with a single valid JSON object."
                        ))));
                    }
                }
            }

            cont.complete_simple(context, parsed.expect("loop only exits with Some or an early return")).await;
        }
        .instrument(span)
        .await
    }
}

pub struct LlmActionFactory {
    registry: Arc<ServiceRegistry>,
    descriptor: ActionDescriptor,
}

impl LlmActionFactory {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        let descriptor = ActionDescriptor::new("llm").with_config_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "service": { "type": "string" },
                "model": { "type": "string" }
            },
            "additionalProperties": false
        }));
        Self { registry, descriptor }
    }
}

impl ActionFactory for LlmActionFactory {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn build(&self, config: &Value, machine: &Machine, state: &State) -> Result<BoxedAction> {
        let config: LlmActionConfig = if config.is_null() {
            LlmActionConfig::default()
        } else {
            serde_json::from_value(config.clone())?
        };
        Ok(Arc::new(LlmAction {
            machine: Arc::new(machine.clone()),
            state: Arc::new(state.clone()),
            registry: Arc::clone(&self.registry),
            config,
        }))
    }
}
