//! Engine configuration and cluster manifests
//!
//! - `types`    - serde model for the engine config and `AgentCluster` manifests
//! - `loader`   - layered loading (defaults, file, `GOAGENTS_*` env) and validation
//! - `duration` - human-readable duration (de)serialization

pub mod duration;
mod loader;
mod types;

pub use loader::{
    parse_cluster, validate_cluster, validate_engine_config, ConfigLoader, ManifestFormat,
    ENV_PREFIX,
};
pub use types::*;
