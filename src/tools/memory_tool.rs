//! `memory_*` tools (spec.md §6): thin wrapper around an external
//! persistent-memory CLI (`put | find | ask | stats`, each accepting
//! `--json`). `put` receives its input on stdin; every command's output is
//! truncated at a configurable character limit.

use super::ToolProvider;
use crate::agent::transport::ToolSpec;
use crate::config::MemoryToolConfig;
use async_trait::async_trait;
use serde_json::Value as Json;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct MemoryTool {
    binary_path: String,
    config: MemoryToolConfig,
}

impl MemoryTool {
    pub fn new(binary_path: impl Into<String>, config: MemoryToolConfig) -> Self {
        Self {
            binary_path: binary_path.into(),
            config,
        }
    }

    async fn run(&self, args: &[&str], stdin_data: Option<&str>, timeout: Duration) -> Result<String, String> {
        let mut child = Command::new(&self.binary_path)
            .args(args)
            .stdin(if stdin_data.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn memory CLI: {e}"))?;

        if let Some(data) = stdin_data {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(data.as_bytes())
                    .await
                    .map_err(|e| format!("failed to write memory CLI stdin: {e}"))?;
            }
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("memory CLI timed out after {timeout:?}"))?
            .map_err(|e| format!("memory CLI failed: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("memory CLI exited with {}: {stderr}", output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(truncate(&stdout, self.config.truncate_chars))
    }

    fn cmd_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.config.save_timeout_secs)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

#[async_trait]
impl ToolProvider for MemoryTool {
    fn tool_specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "memory_save".to_string(),
                description: "Save a note to persistent memory.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"],
                }),
            },
            ToolSpec {
                name: "memory_search".to_string(),
                description: "Search persistent memory.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"],
                }),
            },
            ToolSpec {
                name: "memory_ask".to_string(),
                description: "Ask a question against persistent memory.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"question": {"type": "string"}},
                    "required": ["question"],
                }),
            },
            ToolSpec {
                name: "memory_stats".to_string(),
                description: "Return persistent memory statistics.".to_string(),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
            },
        ]
    }

    async fn call_text(&self, name: &str, args: Json) -> Result<String, String> {
        match name {
            "memory_save" => {
                let text = args.get("text").and_then(|v| v.as_str()).ok_or("missing required field: text")?;
                self.run(&["put", "--json"], Some(text), self.save_timeout()).await
            }
            "memory_search" => {
                let query = args.get("query").and_then(|v| v.as_str()).ok_or("missing required field: query")?;
                self.run(&["find", "--json", query], None, self.cmd_timeout()).await
            }
            "memory_ask" => {
                let question = args
                    .get("question")
                    .and_then(|v| v.as_str())
                    .ok_or("missing required field: question")?;
                self.run(&["ask", "--json", question], None, self.cmd_timeout()).await
            }
            "memory_stats" => self.run(&["stats", "--json"], None, self.cmd_timeout()).await,
            other => Err(format!("unknown memory tool: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_adds_marker_past_limit() {
        let long = "a".repeat(20);
        let truncated = truncate(&long, 5);
        assert_eq!(truncated, format!("{}... (truncated)", "a".repeat(5)));
    }
}
