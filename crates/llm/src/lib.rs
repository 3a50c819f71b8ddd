//! `claij-llm` — the model-facing LLM action (C6): prompt assembly from a
//! machine's schemas and recorded trail, the [`LlmService`] transport
//! contract C6 calls through (C11), and a deterministic reference
//! adapter for exercising the rest of the engine without a real vendor.

pub mod action;
pub mod parse;
pub mod service;
pub mod types;

pub use action::{LlmAction, LlmActionFactory, MCP_STATE};
pub use parse::{parse_structured_reply, strip_code_fences};
pub use service::{transport_error, BoxedLlmService, EchoLlmService, LlmService, ServiceRegistry};
pub use types::{
    BoxStream, ChatOptions, ChatRequest, ChatResponse, Message, Role, StreamEvent, ToolCall, Usage,
};
