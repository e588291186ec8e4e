//! Tool lookup and dispatch by name

use super::{Tool, ToolArgs, ToolResult};
use crate::error::ToolError;
use crate::provider::ToolDefinition;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the tool's own name, replacing any previous entry
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, kind = tool.kind(), "Registered tool");
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions for the registered subset of `names`, in the given order
    pub fn definitions<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<ToolDefinition> {
        let tools = self.tools.read();
        names
            .into_iter()
            .filter_map(|name| tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: serde_json::Value::Object(Default::default()),
            })
            .collect()
    }

    /// Run a tool by name. An unknown tool yields a result carrying an error.
    pub async fn execute(&self, name: &str, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let Some(tool) = self.get(name) else {
            debug!(tool = %name, "Execution requested for unknown tool");
            return Ok(ToolResult::error(format!("tool not found: {}", name)));
        };
        tool.execute(args).await
    }

    /// Close every tool and clear the registry, returning the first failure
    pub async fn close_all(&self) -> Result<(), ToolError> {
        let tools: Vec<(String, Arc<dyn Tool>)> = self.tools.write().drain().collect();

        let mut first_error = None;
        for (name, tool) in tools {
            if let Err(e) = tool.close().await {
                warn!(tool = %name, error = %e, "Failed to close tool");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
