//! Provider-agnostic request/response types for the LLM action (C6) and
//! the [`crate::LlmService`] contract it calls through.

use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A boxed async stream, used for streaming chat responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in the conversation a service is asked to continue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Value,
}

impl Message {
    pub fn system(content: impl Into<Value>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<Value>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<Value>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<claij_schema::Prompt> for Message {
    fn from(p: claij_schema::Prompt) -> Self {
        let role = match p.role {
            claij_schema::Role::System => Role::System,
            claij_schema::Role::User => Role::User,
            claij_schema::Role::Assistant => Role::Assistant,
        };
        Self {
            role,
            content: p.content,
        }
    }
}

/// A tool invocation surfaced by the model (native tool-calling path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Options accompanying a chat request: the structured-output contract
/// and an upper bound on the service's own internal retries.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// The schema the model's reply must conform to, for providers that
    /// support structured output directly.
    pub schema: Option<Value>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub service: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub options: ChatOptions,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Raw textual content; may still be wrapped in markdown code fences.
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Events emitted during a streaming chat call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "token")]
    Token { text: String },

    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },

    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    #[serde(rename = "error")]
    Error { message: String },
}
