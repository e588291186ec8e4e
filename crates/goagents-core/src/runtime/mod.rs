//! Runtime orchestration
//!
//! This module handles:
//! - The cluster registry and cluster-wide stop/delete
//! - Expanding cluster manifests into managed agents
//! - Routing chat requests to agents and their providers
//! - System-wide metrics

mod cluster;
mod engine;
mod metrics;

pub use cluster::Cluster;
pub use engine::Engine;
pub use metrics::SystemMetrics;
