//! In-process provider that echoes the conversation back
//!
//! Used by the CLI under the name `mock` and throughout the tests. Latency
//! and failures can be injected to exercise deadlines and soft failures.

use super::{ChatRequest, ChatResponse, ChatStream, Provider, StreamChunk, Usage};
use crate::error::ProviderError;
use crate::types::{Role, ToolUse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Prefix that makes the echo provider request a tool call: `/tool <name> [json-args]`
const TOOL_DIRECTIVE: &str = "/tool ";

#[derive(Default)]
pub struct EchoProvider {
    latency: Duration,
    failure: Mutex<Option<ProviderError>>,
    calls: AtomicU64,
    last_request: Mutex<Option<ChatRequest>>,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering each call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every call with `error` until cleared
    pub fn failing_with(self, error: ProviderError) -> Self {
        self.set_failure(Some(error));
        self
    }

    pub fn set_failure(&self, error: Option<ProviderError>) {
        *self.failure.lock() = error;
    }

    /// Number of `chat`/`stream_chat` calls received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most recent request, as received
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().clone()
    }

    async fn answer(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let tool_use = parse_tool_directive(last_user, request)
            .into_iter()
            .collect::<Vec<_>>();

        let prompt_tokens = request
            .messages
            .iter()
            .map(|m| word_count(&m.content))
            .sum();
        let content = format!("echo: {}", last_user);

        Ok(ChatResponse {
            id: format!("echo-{}", self.calls()),
            usage: Some(Usage::new(prompt_tokens, word_count(&content))),
            content,
            tool_use,
            model: request.model.clone(),
            error: None,
        })
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.answer(&request).await
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, ProviderError> {
        let response = self.answer(&request).await?;

        let mut chunks: Vec<Result<StreamChunk, ProviderError>> = response
            .content
            .split_inclusive(' ')
            .map(|delta| {
                Ok(StreamChunk {
                    id: response.id.clone(),
                    delta: delta.to_string(),
                    done: false,
                    usage: None,
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk {
            id: response.id.clone(),
            delta: String::new(),
            done: true,
            usage: response.usage,
        }));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Turn `/tool <name> {json}` into a tool call, if `<name>` was offered
fn parse_tool_directive(message: &str, request: &ChatRequest) -> Option<ToolUse> {
    let rest = message.strip_prefix(TOOL_DIRECTIVE)?;
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    if !request.tools.iter().any(|t| t.name == name) {
        return None;
    }

    let args = match serde_json::from_str::<serde_json::Value>(args.trim()) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };

    Some(ToolUse {
        id: format!("call-{}", name),
        name: name.to_string(),
        args,
    })
}
