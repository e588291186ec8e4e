//! Agent configuration and state types

use crate::error::AgentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Idle timeout applied when neither the agent nor its cluster sets one
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Agent configuration, copied into the agent at creation and never mutated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolRef>,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub scaling: ScalingBounds,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
    #[serde(
        default,
        with = "crate::config::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_timeout: Option<Duration>,
}

impl AgentConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.resources.timeout = Some(timeout);
        self
    }

    pub fn with_tool(mut self, tool: ToolRef) -> Self {
        self.tools.push(tool);
        self
    }

    /// Idle timeout with the engine default applied
    pub fn effective_idle_timeout(&self) -> Duration {
        match self.idle_timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Check the fields an agent cannot be created without
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.provider.trim().is_empty() {
            return Err(AgentError::InvalidConfig("provider is required".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(AgentError::InvalidConfig("model is required".to_string()));
        }
        if self.scaling.max_instances > 0 && self.scaling.min_instances > self.scaling.max_instances {
            return Err(AgentError::InvalidConfig(format!(
                "min_instances ({}) exceeds max_instances ({})",
                self.scaling.min_instances, self.scaling.max_instances
            )));
        }
        Ok(())
    }
}

/// Reference to a tool connector an agent may use
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ToolAuth>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, String>,
}

impl ToolRef {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }
}

/// Credentials handed to a tool connector
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolAuth {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

// Secrets stay out of logs.
impl fmt::Debug for ToolAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolAuth")
            .field("kind", &self.kind)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Resource hints and the per-request timeout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(
        default,
        with = "crate::config::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingBounds {
    #[serde(default)]
    pub min_instances: u32,
    #[serde(default)]
    pub max_instances: u32,
}

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Created but never started
    Pending,
    /// Supervisor is being brought up
    Starting,
    /// Serving requests
    Running,
    /// No activity within the idle timeout; still servable
    Idle,
    /// Cancellation requested, supervisor winding down
    Stopping,
    /// Scaled to zero
    Stopped,
    /// Supervisor crashed
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Idle => "idle",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Whether a request can be dispatched without starting the agent
    pub fn is_servable(&self) -> bool {
        matches!(self, Self::Running | Self::Idle)
    }

    /// Whether `start` may begin a new supervision run from this status
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Pending | Self::Stopped)
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent request counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub requests_total: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    #[serde(with = "crate::config::duration")]
    pub average_response_time: Duration,
    pub last_request_time: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    /// Record the outcome of a request already counted in `requests_total`.
    ///
    /// Failed requests do not move the average response time.
    pub fn record_outcome(&mut self, success: bool, latency: Duration) {
        if success {
            self.requests_succeeded += 1;
            self.average_response_time = damped_average(self.average_response_time, latency);
        } else {
            self.requests_failed += 1;
        }
        self.last_request_time = Some(Utc::now());
    }
}

/// `(avg + latest) / 2`, the damped average reported by every metrics view
pub fn damped_average(avg: Duration, latest: Duration) -> Duration {
    (avg + latest) / 2
}

/// Point-in-time copy of an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub id: String,
    pub name: String,
    pub cluster: String,
    pub status: AgentStatus,
    pub provider: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub error_message: Option<String>,
    pub metrics: AgentMetrics,
}
