//! `claij-mcp` — the MCP (Model Context Protocol) tool bridge (C12):
//! JSON-RPC 2.0 wire types, the `McpToolBridge` contract the LLM
//! action's tool calls are routed through, an in-process reference
//! implementation, and the action that installs on the state tool calls
//! target.

pub mod action;
pub mod bridge;
pub mod protocol;

pub use action::{McpAction, McpActionFactory};
pub use bridge::{BoxedMcpBridge, InProcessMcpBridge, McpToolBridge};
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpToolDef, ToolCallContent, ToolCallResult,
};
