//! `McpToolBridge` (C12) — the contract the MCP action calls through to
//! discover and invoke tools, plus an in-process reference implementation
//! that registers plain Rust closures instead of spawning a child
//! process. Real deployments back this with a stdio/SSE JSON-RPC
//! transport; the bridge contract is transport-agnostic.

use std::collections::HashMap;
use std::sync::Arc;

use claij_domain::{Error, Result};
use serde_json::Value;

use crate::protocol::{McpToolDef, ToolCallResult};

#[async_trait::async_trait]
pub trait McpToolBridge: Send + Sync {
    /// Tools currently available across every connected server.
    async fn list_tools(&self) -> Vec<McpToolDef>;

    /// Invoke a tool by name with the given arguments.
    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult>;
}

pub type BoxedMcpBridge = Arc<dyn McpToolBridge>;

type ToolHandler = Arc<dyn Fn(Value) -> Result<ToolCallResult> + Send + Sync>;

struct RegisteredTool {
    def: McpToolDef,
    handler: ToolHandler,
}

/// An in-process tool bridge: tools are plain closures registered ahead
/// of time, no sub-process or network round trip. Sufficient to drive
/// tool-call routing end to end in tests and small embeddings that don't
/// need an external MCP server.
#[derive(Default)]
pub struct InProcessMcpBridge {
    tools: HashMap<String, RegisteredTool>,
}

impl InProcessMcpBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        def: McpToolDef,
        handler: impl Fn(Value) -> Result<ToolCallResult> + Send + Sync + 'static,
    ) -> &mut Self {
        self.tools.insert(def.name.clone(), RegisteredTool { def, handler: Arc::new(handler) });
        self
    }
}

#[async_trait::async_trait]
impl McpToolBridge for InProcessMcpBridge {
    async fn list_tools(&self) -> Vec<McpToolDef> {
        self.tools.values().map(|t| t.def.clone()).collect()
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| Error::Mcp(format!("no tool registered under '{tool_name}'")))?;
        (tool.handler)(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_registered_tools() {
        let mut bridge = InProcessMcpBridge::new();
        bridge.register(
            McpToolDef {
                name: "echo".into(),
                description: "echoes input".into(),
                input_schema: serde_json::json!({"type": "object"}),
            },
            |args| Ok(ToolCallResult::ok(args.to_string())),
        );
        assert_eq!(bridge.list_tools().await.len(), 1);
    }

    #[tokio::test]
    async fn calls_registered_tool() {
        let mut bridge = InProcessMcpBridge::new();
        bridge.register(
            McpToolDef {
                name: "echo".into(),
                description: String::new(),
                input_schema: Value::Null,
            },
            |args| Ok(ToolCallResult::ok(args["text"].as_str().unwrap_or("").to_string())),
        );
        let result = bridge.call_tool("echo", serde_json::json!({"text": "hi"})).await.unwrap();
        assert_eq!(result.content[0].text, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let bridge = InProcessMcpBridge::new();
        assert!(bridge.call_tool("missing", Value::Null).await.is_err());
    }
}
