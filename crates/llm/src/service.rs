//! `LlmService` (C11) — the transport contract the action calls through,
//! plus `EchoLlmService`, a deterministic reference/test adapter.

use claij_domain::{Error, Result};

use crate::types::{BoxStream, ChatRequest, ChatResponse, StreamEvent};

#[async_trait::async_trait]
pub trait LlmService: Send + Sync {
    /// Send a chat request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Send a chat request and return a stream of incremental events.
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this service instance, used for
    /// config/event/context fallback resolution (§4.6 step 1).
    fn service_id(&self) -> &str;
}

pub type BoxedLlmService = std::sync::Arc<dyn LlmService>;

/// A deterministic adapter with no network dependency: it echoes back
/// the first enumerated transition constant from the options schema (if
/// one is present) as a minimal well-formed reply. Useful for exercising
/// the dispatcher/action plumbing without a real provider.
pub struct EchoLlmService {
    id: String,
}

impl EchoLlmService {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Default for EchoLlmService {
    fn default() -> Self {
        Self::new("echo")
    }
}

fn first_id_const(schema: &serde_json::Value) -> Option<serde_json::Value> {
    fn dig(v: &serde_json::Value) -> Option<serde_json::Value> {
        if let Some(props) = v.get("properties") {
            if let Some(id) = props.get("id") {
                if let Some(c) = id.get("const") {
                    return Some(c.clone());
                }
            }
        }
        if let Some(all_of) = v.get("allOf").and_then(|a| a.as_array()) {
            for alt in all_of {
                if let Some(found) = dig(alt) {
                    return Some(found);
                }
            }
        }
        if let Some(one_of) = v.get("oneOf").and_then(|a| a.as_array()) {
            if let Some(first) = one_of.first() {
                return dig(first);
            }
        }
        None
    }
    dig(schema)
}

#[async_trait::async_trait]
impl LlmService for EchoLlmService {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let id = req
            .options
            .schema
            .as_ref()
            .and_then(first_id_const)
            .unwrap_or(serde_json::json!(["start", "end"]));
        let content = serde_json::json!({ "id": id }).to_string();
        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            usage: None,
            model: req.model,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let resp = self.chat(req).await?;
        let stream = async_stream::stream! {
            yield Ok(StreamEvent::Token { text: resp.content });
            yield Ok(StreamEvent::Done { usage: resp.usage, finish_reason: resp.finish_reason });
        };
        Ok(Box::pin(stream))
    }

    fn service_id(&self) -> &str {
        &self.id
    }
}

/// Wrap a transport failure (network, deserialize-at-the-HTTP-layer,
/// whatever a real adapter's client library reports) as the shared error
/// kind the LLM action treats as an immediate bail-out.
pub fn transport_error(service: impl Into<String>, message: impl std::fmt::Display) -> Error {
    Error::Provider {
        service: service.into(),
        message: message.to_string(),
    }
}

/// Holds all configured [`LlmService`] instances, keyed by the name a
/// machine's state config (or the engine's `default_llm_service`) names.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: std::collections::HashMap<String, BoxedLlmService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: BoxedLlmService) -> &mut Self {
        self.services.insert(service.service_id().to_string(), service);
        self
    }

    pub fn get(&self, id: &str) -> Option<BoxedLlmService> {
        self.services.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatOptions, Message};

    #[tokio::test]
    async fn echo_service_replies_with_enumerated_id() {
        let svc = EchoLlmService::default();
        let schema = serde_json::json!({
            "oneOf": [
                {"allOf": [{}, {"properties": {"id": {"const": ["ask", "end"]}}}]}
            ]
        });
        let req = ChatRequest {
            service: "echo".into(),
            model: "test".into(),
            messages: vec![Message::user(serde_json::json!("hi"))],
            options: ChatOptions {
                schema: Some(schema),
                max_retries: None,
            },
        };
        let resp = svc.chat(req).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&resp.content).unwrap();
        assert_eq!(parsed["id"], serde_json::json!(["ask", "end"]));
    }
}
