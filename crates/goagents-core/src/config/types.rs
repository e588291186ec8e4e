//! Engine configuration and cluster manifest types

use crate::types::{AgentConfig, ResourceLimits, ScalingBounds, ToolRef, DEFAULT_IDLE_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_VERSION: &str = "goagents.dev/v1";
pub const DEFAULT_KIND: &str = "AgentCluster";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Provider credentials keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderCredentials>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub clusters: Vec<ClusterManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "super::duration")]
    pub timeout: Duration,
    pub log_level: String,
    pub metrics: MetricsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub path: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
            port: 9090,
        }
    }
}

/// Credentials for one provider back end
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(
        default,
        with = "super::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("org_id", &self.org_id)
            .field("project_id", &self.project_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Tunables for the lifecycle manager and dispatch path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the lifecycle event channel
    pub event_buffer: usize,
    /// Upper bound on waiting for an agent to reach running
    #[serde(with = "super::duration")]
    pub startup_timeout: Duration,
    #[serde(with = "super::duration")]
    pub startup_poll_interval: Duration,
    /// Idle timeout for agents whose cluster sets none
    #[serde(with = "super::duration")]
    pub default_idle_timeout: Duration,
    /// Provider deadline when neither the request nor the agent sets one
    #[serde(with = "super::duration")]
    pub default_request_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer: 100,
            startup_timeout: Duration::from_secs(30),
            startup_poll_interval: Duration::from_millis(100),
            default_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            default_request_timeout: Duration::from_secs(30),
        }
    }
}

/// `AgentCluster` manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterManifest {
    #[serde(default, alias = "apiversion")]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: Metadata,
    pub spec: ClusterSpec,
}

impl ClusterManifest {
    /// Minimal manifest, mostly useful for tests and embedding
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            kind: DEFAULT_KIND.to_string(),
            metadata: Metadata {
                name: name.into(),
                namespace: DEFAULT_NAMESPACE.to_string(),
                labels: HashMap::new(),
            },
            spec: ClusterSpec::default(),
        }
    }

    pub fn with_agent(mut self, agent: AgentSpec) -> Self {
        self.spec.agents.push(agent);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.spec.resource_policy.idle_timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSpec {
    #[serde(default)]
    pub resource_policy: ResourcePolicy,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcePolicy {
    #[serde(default)]
    pub max_concurrent_agents: u32,
    #[serde(
        default,
        with = "super::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_timeout: Option<Duration>,
    #[serde(default)]
    pub scale_to_zero: bool,
}

/// One agent entry in a cluster manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolRef>,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub scaling: ScalingBounds,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
}

impl AgentSpec {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn depends_on(mut self, agent: impl Into<String>) -> Self {
        self.depends_on.push(agent.into());
        self
    }

    /// Expand into the immutable config copied into the agent.
    ///
    /// The cluster idle timeout wins over `default_idle_timeout`.
    pub fn to_agent_config(
        &self,
        policy: &ResourcePolicy,
        default_idle_timeout: Duration,
    ) -> AgentConfig {
        AgentConfig {
            provider: self.provider.clone(),
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone().filter(|p| !p.is_empty()),
            tools: self.tools.clone(),
            resources: self.resources.clone(),
            scaling: self.scaling,
            environment: self.environment.clone(),
            idle_timeout: Some(policy.idle_timeout.unwrap_or(default_idle_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_spec_expansion_uses_cluster_idle_timeout() {
        let spec = AgentSpec::new("writer", "mock", "m1").with_system_prompt("be brief");
        let policy = ResourcePolicy {
            idle_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };

        let config = spec.to_agent_config(&policy, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.system_prompt.as_deref(), Some("be brief"));

        let config = spec.to_agent_config(&ResourcePolicy::default(), Duration::from_secs(9));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(9)));
    }

    #[test]
    fn test_empty_system_prompt_is_dropped() {
        let spec = AgentSpec::new("writer", "mock", "m1").with_system_prompt("");
        let config = spec.to_agent_config(&ResourcePolicy::default(), DEFAULT_IDLE_TIMEOUT);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = ProviderCredentials {
            api_key: "sk-live-123".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", creds).contains("sk-live-123"));
    }
}
