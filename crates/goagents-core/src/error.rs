//! Error types for GoAgents Core

use crate::types::AgentStatus;
use std::time::Duration;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Agent lifecycle errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent {id} cannot {operation} while {status}")]
    InvalidState {
        id: String,
        status: AgentStatus,
        operation: &'static str,
    },

    #[error("Agent {id} did not reach running within {timeout:?}")]
    StartupTimeout { id: String, timeout: Duration },

    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),
}

/// Cluster registry errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Cluster not found: {0}")]
    NotFound(String),

    #[error("Cluster already exists: {0}")]
    AlreadyExists(String),

    #[error("Agent {agent} not found in cluster {cluster}")]
    AgentNotFound { cluster: String, agent: String },
}

/// Errors raised at the provider boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not available: {0}")]
    Unavailable(String),

    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Streaming not supported by provider {0}")]
    StreamingUnsupported(String),
}

/// Errors raised at the tool boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArgs(String),

    #[error("Tool connection failed: {0}")]
    Connection(String),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(ConfigError::Parse {
            path: "<layered config>".to_string(),
            message: err.to_string(),
        })
    }
}

impl Error {
    /// Stable machine-readable tag for the error category
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Agent(AgentError::NotFound(_))
            | Error::Cluster(ClusterError::NotFound(_))
            | Error::Cluster(ClusterError::AgentNotFound { .. }) => "not_found",
            Error::Agent(AgentError::InvalidState { .. }) => "invalid_state",
            Error::Agent(AgentError::StartupTimeout { .. }) => "startup_timeout",
            Error::Agent(AgentError::InvalidConfig(_))
            | Error::Config(ConfigError::Validation(_)) => "validation",
            Error::Cluster(ClusterError::AlreadyExists(_)) => "already_exists",
            Error::Provider(ProviderError::Unavailable(_)) => "provider_unavailable",
            Error::Provider(_) => "provider",
            Error::Tool(_) => "tool",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == "not_found"
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
