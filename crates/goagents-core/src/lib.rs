//! GoAgents Core Library
//!
//! This crate provides the runtime orchestration engine for GoAgents:
//! - Cluster registry and deployment of agent clusters
//! - Agent lifecycle management with scale-from-zero and idle detection
//! - Request dispatch to pluggable LLM providers
//! - Configuration loading and manifest validation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     goagents-core                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  runtime/      - Engine, cluster registry, metrics          │
//! │  agent/        - Agent lifecycle, supervision, events       │
//! │  provider/     - Provider trait, registry, echo provider    │
//! │  tool/         - Tool trait and registry                    │
//! │  config/       - Engine config, manifests, validation       │
//! │  types/        - Shared type definitions                    │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod provider;
pub mod runtime;
pub mod tool;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;

// Re-export engine components
pub use agent::{Agent, AgentManager, EventBus};
pub use runtime::{Cluster, Engine, SystemMetrics};

// Re-export boundaries
pub use config::{ClusterManifest, ConfigLoader, EngineConfig, RuntimeConfig};
pub use provider::{EchoProvider, Provider, ProviderRegistry};
pub use tool::{Tool, ToolRegistry, ToolResult};
