//! C11 — ReAct Agent main loop (spec.md §4.9). Strict sequence of LLM
//! calls; tool calls inside one round run concurrently with each other but
//! all complete before the next LLM call (spec.md §5).

use crate::agent::compaction::compact_until_under_budget;
use crate::agent::message::{ContentBlock, Message, ToolResultBlock};
use crate::agent::transport::{LlmTransport, ToolSpec};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::tools::ToolRouter;
use futures_util::future::join_all;
use std::collections::BTreeSet;

pub struct ReactAgent<'a> {
    transport: &'a dyn LlmTransport,
    tools: &'a ToolRouter,
    config: AgentConfig,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub final_text: String,
    pub full_conversation: Vec<Message>,
    pub tools_used: Vec<String>,
}

impl<'a> ReactAgent<'a> {
    pub fn new(transport: &'a dyn LlmTransport, tools: &'a ToolRouter, config: AgentConfig) -> Self {
        Self { transport, tools, config }
    }

    pub async fn run(&self, initial_messages: Vec<Message>) -> Result<RunOutcome, AgentError> {
        let mut active = initial_messages.clone();
        let mut full = initial_messages;
        let mut tools_used: BTreeSet<String> = BTreeSet::new();
        let tool_specs: Vec<ToolSpec> = self.tools.list_tools().to_vec();
        let budget_chars = self.config.max_context_tokens.saturating_mul(4);

        for round in 1..=self.config.max_rounds {
            let is_final_round = round == self.config.max_rounds;

            let estimate = estimate_context_chars(&active, &tool_specs);
            if estimate > budget_chars {
                active = compact_until_under_budget(self.transport, active, budget_chars).await;
            }

            if is_final_round && !self.config.finalization_prompt.is_empty() {
                let finalization = Message::user_text(self.config.finalization_prompt.clone());
                active.push(finalization.clone());
                full.push(finalization);
            }

            let response = self
                .transport
                .call(&active, &tool_specs)
                .await
                .map_err(AgentError::Transport)?;

            let assistant_msg = Message::AssistantMixed {
                blocks: response.blocks.clone(),
            };
            active.push(assistant_msg.clone());
            full.push(assistant_msg.clone());

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .blocks
                .into_iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, name, input } => Some((id, name, input)),
                    ContentBlock::Text { .. } => None,
                })
                .collect();

            if tool_uses.is_empty() {
                return Ok(RunOutcome {
                    final_text: assistant_msg.text_only(),
                    full_conversation: full,
                    tools_used: tools_used.into_iter().collect(),
                });
            }

            for (_, name, _) in &tool_uses {
                tools_used.insert(name.clone());
            }

            if is_final_round {
                return Err(AgentError::MaxRoundsExceeded(self.config.max_rounds));
            }

            let results: Vec<ToolResultBlock> = join_all(tool_uses.iter().map(|(id, name, input)| {
                let id = id.clone();
                let name = name.clone();
                let input = input.clone();
                async move {
                    let (text, is_error) = self.tools.call_text(&name, input).await;
                    ToolResultBlock {
                        tool_use_id: id,
                        content: text,
                        is_error,
                    }
                }
            }))
            .await;

            let tool_messages = self.transport.convert_tool_results(results);
            active.extend(tool_messages.clone());
            full.extend(tool_messages);
        }

        Err(AgentError::MaxRoundsExceeded(self.config.max_rounds))
    }
}

/// `tokens ≈ chars / 4` over serialized messages plus tool specs (spec.md
/// §4.9 step 1).
fn estimate_context_chars(messages: &[Message], tools: &[ToolSpec]) -> usize {
    let messages_chars: usize = messages.iter().map(|m| m.approx_chars()).sum();
    let tools_chars: usize = tools
        .iter()
        .map(|t| t.name.len() + t.description.len() + t.input_schema.to_string().len())
        .sum();
    messages_chars + tools_chars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transport::mock::ScriptedTransport;
    use crate::agent::transport::LlmResponse;
    use crate::tools::ToolProvider;
    use async_trait::async_trait;

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            blocks: vec![ContentBlock::Text { text: text.to_string() }],
        }
    }

    fn tool_use_response(id: &str, name: &str, input: serde_json::Value) -> LlmResponse {
        LlmResponse {
            blocks: vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
        }
    }

    struct EchoTool;

    #[async_trait]
    impl ToolProvider for EchoTool {
        fn tool_specs(&self) -> Vec<ToolSpec> {
            vec![ToolSpec {
                name: "query".to_string(),
                description: "test".to_string(),
                input_schema: serde_json::json!({}),
            }]
        }

        async fn call_text(&self, _name: &str, _args: serde_json::Value) -> Result<String, String> {
            Ok(r#"{"count":1,"rows":[{"n":42}]}"#.to_string())
        }
    }

    #[tokio::test]
    async fn terminates_on_pure_text_response() {
        let transport = ScriptedTransport::new(vec![text_response("hello there")]);
        let providers: Vec<Box<dyn ToolProvider>> = vec![];
        let router = ToolRouter::new(providers).unwrap();
        let agent = ReactAgent::new(&transport, &router, AgentConfig::default());

        let outcome = agent.run(vec![Message::user_text("hello")]).await.unwrap();
        assert_eq!(outcome.final_text, "hello there");
        assert!(outcome.tools_used.is_empty());
    }

    #[tokio::test]
    async fn executes_tool_then_returns_text() {
        let transport = ScriptedTransport::new(vec![
            tool_use_response("1", "query", serde_json::json!({"sql": "select count(*) from dz_users_current"})),
            text_response("42 users."),
        ]);
        let providers: Vec<Box<dyn ToolProvider>> = vec![Box::new(EchoTool)];
        let router = ToolRouter::new(providers).unwrap();
        let agent = ReactAgent::new(&transport, &router, AgentConfig::default());

        let outcome = agent.run(vec![Message::user_text("count users")]).await.unwrap();
        assert_eq!(outcome.final_text, "42 users.");
        assert_eq!(outcome.tools_used, vec!["query".to_string()]);
    }

    #[tokio::test]
    async fn compacts_long_history_before_calling_the_llm() {
        let mut config = AgentConfig::default();
        config.max_context_tokens = 750; // budget_chars = 3000, well under the raw 35-message history

        let seed_len = 35;
        let mut seed_and_history = vec![Message::user_text("seed question")];
        for i in 0..34 {
            seed_and_history.push(Message::user_text(format!("padding turn {i} {}", "a".repeat(180))));
        }
        assert_eq!(seed_and_history.len(), seed_len);
        assert!(seed_and_history.len() > 30);

        let transport = ScriptedTransport::new(vec![
            text_response("summary of the padding turns"),
            text_response("final answer"),
        ]);
        let providers: Vec<Box<dyn ToolProvider>> = vec![];
        let router = ToolRouter::new(providers).unwrap();
        let agent = ReactAgent::new(&transport, &router, config);

        let outcome = agent.run(seed_and_history).await.unwrap();
        assert_eq!(outcome.final_text, "final answer");
        assert!(outcome.full_conversation.len() > 30);

        let calls = transport.calls.lock().unwrap();
        let round_call = calls.last().expect("expected at least one LLM call");
        let has_summary = round_call
            .iter()
            .any(|m| m.text_only().starts_with("[Previous conversation summary]: "));
        assert!(has_summary, "expected the final round's sent messages to carry a compacted summary");
        assert!(
            round_call.len() < seed_len,
            "expected the sent messages to be shorter than the uncompacted history"
        );
    }

    #[tokio::test]
    async fn max_rounds_exceeded_when_final_round_still_calls_tools() {
        let mut config = AgentConfig::default();
        config.max_rounds = 1;
        config.finalization_prompt = String::new();
        let transport = ScriptedTransport::new(vec![tool_use_response("1", "query", serde_json::json!({}))]);
        let providers: Vec<Box<dyn ToolProvider>> = vec![Box::new(EchoTool)];
        let router = ToolRouter::new(providers).unwrap();
        let agent = ReactAgent::new(&transport, &router, config);

        let result = agent.run(vec![Message::user_text("go")]).await;
        assert!(matches!(result, Err(AgentError::MaxRoundsExceeded(1))));
    }
}
