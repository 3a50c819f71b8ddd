//! The MCP action: installed on the state tool-call events route to. It
//! invokes each requested tool via the [`McpToolBridge`] and hands the
//! continuation an event carrying the results, routed to the configured
//! success transition.

use std::sync::Arc;

use claij_domain::{
    make_event, Action, ActionDescriptor, ActionFactory, BoxedAction, Context, Continuation,
    ContinuationExt, Error, Event, Machine, Result, State, Trail, TransitionId,
};
use serde_json::Value;
use tracing::Instrument;

use crate::bridge::BoxedMcpBridge;
use crate::protocol::ToolCallResult;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct McpActionConfig {
    success_to: String,
}

pub struct McpAction {
    state_id: String,
    success_to: String,
    bridge: BoxedMcpBridge,
}

async fn invoke_one(bridge: &BoxedMcpBridge, call: &Value) -> Value {
    let call_id = call.get("call_id").and_then(Value::as_str).unwrap_or_default();
    let tool_name = call.get("tool_name").and_then(Value::as_str).unwrap_or_default();
    let arguments = call.get("arguments").cloned().unwrap_or(Value::Null);

    let result = match bridge.call_tool(tool_name, arguments).await {
        Ok(r) => r,
        Err(e) => ToolCallResult::err(e.to_string()),
    };

    serde_json::json!({
        "call_id": call_id,
        "tool_name": tool_name,
        "result": result,
    })
}

#[async_trait::async_trait]
impl Action for McpAction {
    async fn run(&self, context: Context, event: Event, _trail: Trail, cont: Arc<dyn Continuation>) {
        let span = tracing::info_span!("mcp.call", state = %self.state_id);
        async move {
            let calls = event.get("tool_calls").and_then(Value::as_array).cloned().unwrap_or_default();
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(invoke_one(&self.bridge, call).await);
            }

            let out = make_event(
                TransitionId::new(self.state_id.clone(), self.success_to.clone()),
                serde_json::json!({ "tool_results": results }),
            );
            cont.complete_simple(context, out).await;
        }
        .instrument(span)
        .await
    }
}

pub struct McpActionFactory {
    bridge: BoxedMcpBridge,
    descriptor: ActionDescriptor,
}

impl McpActionFactory {
    pub fn new(bridge: BoxedMcpBridge) -> Self {
        let descriptor = ActionDescriptor::new("mcp").with_config_schema(serde_json::json!({
            "type": "object",
            "properties": { "success_to": { "type": "string" } },
            "required": ["success_to"],
            "additionalProperties": false
        }));
        Self { bridge, descriptor }
    }
}

impl ActionFactory for McpActionFactory {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn build(&self, config: &Value, _machine: &Machine, state: &State) -> Result<BoxedAction> {
        let config: McpActionConfig = serde_json::from_value(config.clone()).map_err(|e| Error::InvalidConfig {
            action: "mcp".to_string(),
            errors: vec![e.to_string()],
        })?;
        Ok(Arc::new(McpAction {
            state_id: state.id.clone(),
            success_to: config.success_to,
            bridge: Arc::clone(&self.bridge),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::InProcessMcpBridge;
    use crate::protocol::McpToolDef;
    use claij_domain::{EngineConfig, State as DomainState};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct CaptureCont(Mutex<Option<Event>>);

    #[async_trait::async_trait]
    impl Continuation for CaptureCont {
        async fn complete(&self, _context: Context, event: Event, _trail_override: Option<Trail>) {
            *self.0.lock().unwrap() = Some(event);
        }
    }

    #[tokio::test]
    async fn routes_tool_results_to_success_transition() {
        let mut bridge = InProcessMcpBridge::new();
        bridge.register(
            McpToolDef {
                name: "echo".into(),
                description: String::new(),
                input_schema: Value::Null,
            },
            |args| Ok(ToolCallResult::ok(args["text"].as_str().unwrap_or("").to_string())),
        );
        let factory = McpActionFactory::new(Arc::new(bridge));
        let machine = Machine {
            id: "m".into(),
            description: None,
            version: None,
            schemas: HashMap::new(),
            schema: None,
            prompts: Vec::new(),
            hats: Vec::new(),
            states: vec![DomainState::new("mcp")],
            transitions: Vec::new(),
        };
        let state = DomainState::new("mcp");
        let action = factory
            .build(&serde_json::json!({"success_to": "ask"}), &machine, &state)
            .unwrap();

        let event = serde_json::json!({
            "id": ["ask", "mcp"],
            "tool_calls": [{"call_id": "1", "tool_name": "echo", "arguments": {"text": "hi"}}]
        });
        let context = Context::new(HashMap::new(), EngineConfig::default());
        let cont = Arc::new(CaptureCont(Mutex::new(None)));
        action.run(context, event, Trail::new(), cont.clone()).await;

        let out = cont.0.lock().unwrap().clone().unwrap();
        assert_eq!(out["id"], serde_json::json!(["mcp", "ask"]));
        assert_eq!(out["tool_results"][0]["result"]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_an_error_result_not_a_bail_out() {
        let bridge = InProcessMcpBridge::new();
        let factory = McpActionFactory::new(Arc::new(bridge));
        let machine = Machine {
            id: "m".into(),
            description: None,
            version: None,
            schemas: HashMap::new(),
            schema: None,
            prompts: Vec::new(),
            hats: Vec::new(),
            states: vec![DomainState::new("mcp")],
            transitions: Vec::new(),
        };
        let state = DomainState::new("mcp");
        let action = factory
            .build(&serde_json::json!({"success_to": "ask"}), &machine, &state)
            .unwrap();
        let event = serde_json::json!({
            "id": ["ask", "mcp"],
            "tool_calls": [{"call_id": "1", "tool_name": "missing", "arguments": {}}]
        });
        let context = Context::new(HashMap::new(), EngineConfig::default());
        let cont = Arc::new(CaptureCont(Mutex::new(None)));
        action.run(context, event, Trail::new(), cont.clone()).await;
        let out = cont.0.lock().unwrap().clone().unwrap();
        assert!(out["tool_results"][0]["result"]["isError"].as_bool().unwrap());
    }
}
