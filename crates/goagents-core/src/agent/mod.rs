//! Agent lifecycle management
//!
//! This module handles:
//! - Agent creation, start, stop and deletion
//! - Per-agent supervision (idle detection, cancellation, panic recovery)
//! - Request accounting on a single agent
//! - The bounded lifecycle event channel

mod events;
mod instance;
mod manager;
mod supervisor;

pub use events::EventBus;
pub use instance::Agent;
pub use manager::AgentManager;

pub(crate) use supervisor::deadline_after;
