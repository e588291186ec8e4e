//! LLM provider boundary
//!
//! Vendor wire clients live outside the engine. The engine only sees the
//! `Provider` trait and looks implementations up by name in a
//! `ProviderRegistry`.

mod echo;
mod registry;

pub use echo::EchoProvider;
pub use registry::ProviderRegistry;

use crate::error::ProviderError;
use crate::types::{Message, ToolUse};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stream of incremental completion chunks
pub type ChatStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

/// Chat completion capability of one LLM back end
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider kind, e.g. "anthropic"
    fn name(&self) -> &'static str;

    /// Models this provider advertises; empty means unrestricted
    fn models(&self) -> Vec<String> {
        Vec::new()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, ProviderError> {
        let _ = request;
        Err(ProviderError::StreamingUnsupported(self.name().to_string()))
    }

    /// Release connections; called once during engine shutdown
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_use: Vec<ToolUse>,
    #[serde(default)]
    pub model: String,
    /// Application-level error reported inside an otherwise valid reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: String,
    pub delta: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}
