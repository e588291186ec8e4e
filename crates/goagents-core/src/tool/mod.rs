//! Tool connector boundary
//!
//! Connectors (HTTP, WebSocket, MCP bridges) are implemented outside the
//! engine. Agents reference tools by name; the engine resolves them through
//! a `ToolRegistry` and relays model-requested invocations back to callers.

mod registry;

pub use registry::ToolRegistry;

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Arguments passed to a tool invocation
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Connector kind, e.g. "http" or "websocket"
    fn kind(&self) -> &str;

    /// Human-readable description offered to the model
    fn description(&self) -> &str {
        ""
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError>;

    async fn close(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}
