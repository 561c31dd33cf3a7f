//! C12 — Multi-Tool Router. Composes N tool providers into one namespace;
//! construction fails on any name collision. Dispatches `call_text` to the
//! provider that advertised the name, or reports `UnknownTool`.

pub mod memory_tool;
pub mod query_tool;
pub mod topology_tool;

use crate::agent::transport::ToolSpec;
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::HashMap;

pub use memory_tool::MemoryTool;
pub use query_tool::QueryTool;
pub use topology_tool::TopologyTool;

#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn tool_specs(&self) -> Vec<ToolSpec>;
    async fn call_text(&self, name: &str, args: Json) -> Result<String, String>;
}

pub struct ToolRouter {
    providers: Vec<Box<dyn ToolProvider>>,
    name_to_provider: HashMap<String, usize>,
    order: Vec<ToolSpec>,
}

impl ToolRouter {
    pub fn new(providers: Vec<Box<dyn ToolProvider>>) -> Result<Self, ToolError> {
        let mut name_to_provider = HashMap::new();
        let mut order = Vec::new();
        for (idx, provider) in providers.iter().enumerate() {
            for spec in provider.tool_specs() {
                if name_to_provider.contains_key(&spec.name) {
                    return Err(ToolError::DuplicateTool(spec.name));
                }
                name_to_provider.insert(spec.name.clone(), idx);
                order.push(spec);
            }
        }
        Ok(Self {
            providers,
            name_to_provider,
            order,
        })
    }

    pub fn list_tools(&self) -> &[ToolSpec] {
        &self.order
    }

    /// Returns `(text, is_error)`, matching the agent loop's expectation
    /// (spec.md §4.9 step 8).
    pub async fn call_text(&self, name: &str, args: Json) -> (String, bool) {
        match self.name_to_provider.get(name) {
            None => ToolError::UnknownTool(name.to_string()).as_tool_result(),
            Some(&idx) => match self.providers[idx].call_text(name, args).await {
                Ok(text) => (text, false),
                Err(message) => ToolError::Failed {
                    name: name.to_string(),
                    message,
                }
                .as_tool_result(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        names: Vec<&'static str>,
    }

    #[async_trait]
    impl ToolProvider for StubProvider {
        fn tool_specs(&self) -> Vec<ToolSpec> {
            self.names
                .iter()
                .map(|n| ToolSpec {
                    name: n.to_string(),
                    description: String::new(),
                    input_schema: serde_json::json!({}),
                })
                .collect()
        }

        async fn call_text(&self, name: &str, _args: Json) -> Result<String, String> {
            Ok(format!("called {name}"))
        }
    }

    #[test]
    fn construction_fails_on_name_collision() {
        let providers: Vec<Box<dyn ToolProvider>> = vec![
            Box::new(StubProvider { names: vec!["query"] }),
            Box::new(StubProvider { names: vec!["query"] }),
        ];
        assert!(ToolRouter::new(providers).is_err());
    }

    #[tokio::test]
    async fn unknown_tool_reports_error() {
        let providers: Vec<Box<dyn ToolProvider>> = vec![Box::new(StubProvider { names: vec!["query"] })];
        let router = ToolRouter::new(providers).unwrap();
        let (text, is_error) = router.call_text("nonexistent", serde_json::json!({})).await;
        assert!(is_error);
        assert!(text.contains("unknown tool"));
    }

    #[tokio::test]
    async fn dispatches_to_owning_provider() {
        let providers: Vec<Box<dyn ToolProvider>> = vec![Box::new(StubProvider { names: vec!["query"] })];
        let router = ToolRouter::new(providers).unwrap();
        let (text, is_error) = router.call_text("query", serde_json::json!({})).await;
        assert!(!is_error);
        assert_eq!(text, "called query");
    }
}
