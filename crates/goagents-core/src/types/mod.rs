//! Core type definitions for GoAgents
//!
//! This module contains the shared data model used across the engine:
//! agent configuration and state, cluster views, chat requests and
//! responses, lifecycle events and metric snapshots.

mod agent_types;
mod cluster_types;
mod event_types;
mod metrics_types;
mod request_types;

pub use agent_types::*;
pub use cluster_types::*;
pub use event_types::*;
pub use metrics_types::*;
pub use request_types::*;
