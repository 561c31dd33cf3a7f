//! LLM transport (spec.md §6, §4.9): one abstract `call(messages, tools)`
//! boundary behind which either provider shape can sit. [`OllamaTransport`]
//! is the concrete implementation; it speaks Ollama's `/api/chat` wire
//! format and is the one shape that needs `unquote_tool_arguments` on the
//! way in.

use crate::agent::message::{ContentBlock, Message, ToolResultBlock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Json,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub blocks: Vec<ContentBlock>,
}

#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn call(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<LlmResponse, String>;

    fn create_user_message(&self, text: &str) -> Message {
        Message::user_text(text)
    }

    fn convert_tool_results(&self, results: Vec<ToolResultBlock>) -> Vec<Message> {
        vec![Message::ToolResult { results }]
    }
}

/// Unwraps a tool-call argument payload that may be double-JSON-encoded, a
/// quirk of Ollama-style `function.arguments` fields (spec.md §6). Treats a
/// JSON `null` as `{}`. Unwraps at most two levels of string-encoding.
pub fn unquote_tool_arguments(raw: &Json) -> Json {
    let mut current = raw.clone();
    for _ in 0..2 {
        match &current {
            Json::Null => return serde_json::json!({}),
            Json::String(s) => match serde_json::from_str::<Json>(s) {
                Ok(parsed) => current = parsed,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Ollama `/api/chat` wire format (spec.md §6): the one concrete
/// `LlmTransport`. Tool calls round-trip through [`unquote_tool_arguments`]
/// since Ollama sometimes hands back `function.arguments` as a
/// double-JSON-encoded string rather than a plain object.
pub struct OllamaTransport {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaTransport {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaTool {
    r#type: &'static str,
    function: OllamaToolFunction,
}

#[derive(Debug, Serialize)]
struct OllamaToolFunction {
    name: String,
    description: String,
    parameters: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Json,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

fn to_ollama_message(message: &Message) -> OllamaMessage {
    match message {
        Message::UserText { text } => OllamaMessage {
            role: "user".to_string(),
            content: text.clone(),
            tool_calls: Vec::new(),
        },
        Message::AssistantMixed { blocks } => OllamaMessage {
            role: "assistant".to_string(),
            content: message.text_only(),
            tool_calls: blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { name, input, .. } => Some(OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: name.clone(),
                            arguments: input.clone(),
                        },
                    }),
                    _ => None,
                })
                .collect(),
        },
        Message::ToolResult { results } => OllamaMessage {
            role: "tool".to_string(),
            content: results.iter().map(|r| r.content.as_str()).collect::<Vec<_>>().join("\n"),
            tool_calls: Vec::new(),
        },
    }
}

/// Converts an Ollama response message into the abstract block form,
/// unwrapping each tool call's arguments through [`unquote_tool_arguments`].
/// Tool-call ids are synthesized (`call_0`, `call_1`, ...) since Ollama's
/// wire format doesn't assign them.
fn from_ollama_message(message: OllamaMessage) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    if !message.content.is_empty() {
        blocks.push(ContentBlock::Text { text: message.content });
    }
    for (i, call) in message.tool_calls.into_iter().enumerate() {
        blocks.push(ContentBlock::ToolUse {
            id: format!("call_{i}"),
            name: call.function.name,
            input: unquote_tool_arguments(&call.function.arguments),
        });
    }
    blocks
}

#[async_trait]
impl LlmTransport for OllamaTransport {
    async fn call(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<LlmResponse, String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            messages: messages.iter().map(to_ollama_message).collect(),
            tools: tools
                .iter()
                .map(|t| OllamaTool {
                    r#type: "function",
                    function: OllamaToolFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect(),
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("ollama http {status}: {text}"));
        }
        let body: OllamaChatResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(LlmResponse {
            blocks: from_ollama_message(body.message),
        })
    }

    fn convert_tool_results(&self, results: Vec<ToolResultBlock>) -> Vec<Message> {
        vec![Message::ToolResult { results }]
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Scripted transport for tests: returns queued responses in order and
    /// records the messages it was called with, so a test can inspect what
    /// was actually sent on a given round.
    pub struct ScriptedTransport {
        pub responses: Mutex<Vec<LlmResponse>>,
        pub calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmTransport for ScriptedTransport {
        async fn call(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<LlmResponse, String> {
            self.calls.lock().unwrap().push(messages.to_vec());
            let mut guard = self.responses.lock().unwrap();
            if guard.is_empty() {
                return Err("scripted transport exhausted".to_string());
            }
            Ok(guard.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquote_handles_null_as_empty_object() {
        assert_eq!(unquote_tool_arguments(&Json::Null), serde_json::json!({}));
    }

    #[test]
    fn unquote_unwraps_double_encoded_string() {
        let inner = serde_json::json!({"sql": "select 1"});
        let once = Json::String(inner.to_string());
        let twice = Json::String(once.to_string());
        assert_eq!(unquote_tool_arguments(&twice), inner);
    }

    #[test]
    fn unquote_leaves_plain_object_untouched() {
        let obj = serde_json::json!({"a": 1});
        assert_eq!(unquote_tool_arguments(&obj), obj);
    }

    #[test]
    fn to_ollama_message_carries_tool_calls() {
        let msg = Message::AssistantMixed {
            blocks: vec![
                ContentBlock::Text { text: "checking".into() },
                ContentBlock::ToolUse {
                    id: "1".into(),
                    name: "query".into(),
                    input: serde_json::json!({"sql": "select 1"}),
                },
            ],
        };
        let ollama = to_ollama_message(&msg);
        assert_eq!(ollama.role, "assistant");
        assert_eq!(ollama.content, "checking");
        assert_eq!(ollama.tool_calls.len(), 1);
        assert_eq!(ollama.tool_calls[0].function.name, "query");
    }

    #[test]
    fn from_ollama_message_unquotes_double_encoded_arguments() {
        let inner = serde_json::json!({"sql": "select 1"});
        let doubly_encoded = Json::String(Json::String(inner.to_string()).to_string());
        let message = OllamaMessage {
            role: "assistant".to_string(),
            content: String::new(),
            tool_calls: vec![OllamaToolCall {
                function: OllamaFunctionCall {
                    name: "query".to_string(),
                    arguments: doubly_encoded,
                },
            }],
        };
        let blocks = from_ollama_message(message);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "call_0");
                assert_eq!(name, "query");
                assert_eq!(input, &inner);
            }
            _ => panic!("expected ToolUse block"),
        }
    }

    #[test]
    fn from_ollama_message_treats_null_arguments_as_empty_object() {
        let message = OllamaMessage {
            role: "assistant".to_string(),
            content: "done".to_string(),
            tool_calls: vec![OllamaToolCall {
                function: OllamaFunctionCall {
                    name: "noop".to_string(),
                    arguments: Json::Null,
                },
            }],
        };
        let blocks = from_ollama_message(message);
        assert_eq!(blocks.len(), 2);
        match &blocks[1] {
            ContentBlock::ToolUse { input, .. } => assert_eq!(input, &serde_json::json!({})),
            _ => panic!("expected ToolUse block"),
        }
    }
}
