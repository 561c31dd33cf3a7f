//! Message model (spec.md §4.9): language-neutral representation the ReAct
//! loop operates on, independent of which LLM transport renders it.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Json },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    UserText { text: String },
    AssistantMixed { blocks: Vec<ContentBlock> },
    ToolResult { results: Vec<ToolResultBlock> },
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Message::UserText { text: text.into() }
    }

    /// Ordered `tool_use` blocks in an assistant message, empty for the
    /// other variants.
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        match self {
            Message::AssistantMixed { blocks } => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Concatenated text blocks in an assistant message, empty string for
    /// the other variants.
    pub fn text_only(&self) -> String {
        match self {
            Message::AssistantMixed { blocks } => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            Message::UserText { text } => text.clone(),
            Message::ToolResult { .. } => String::new(),
        }
    }

    /// Approximate serialized size in characters, used for the `chars / 4`
    /// token estimate (spec.md §4.9 step 1).
    pub fn approx_chars(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_uses_extracts_only_tool_use_blocks() {
        let msg = Message::AssistantMixed {
            blocks: vec![
                ContentBlock::Text { text: "thinking...".into() },
                ContentBlock::ToolUse {
                    id: "1".into(),
                    name: "query".into(),
                    input: serde_json::json!({"sql": "select 1"}),
                },
            ],
        };
        assert_eq!(msg.tool_uses().len(), 1);
        assert_eq!(msg.text_only(), "thinking...");
    }
}
