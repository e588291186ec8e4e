//! A deployed cluster and its agent map

use crate::agent::Agent;
use crate::config::ClusterManifest;
use crate::types::{AgentView, ClusterStatus, ClusterView};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Cluster {
    manifest: ClusterManifest,
    created_at: DateTime<Utc>,
    state: RwLock<ClusterState>,
    /// Agents keyed by their name within the cluster
    agents: RwLock<HashMap<String, Arc<Agent>>>,
    /// Fired on delete so an unfinished deploy stops adding agents
    removed: CancellationToken,
}

struct ClusterState {
    status: ClusterStatus,
    updated_at: DateTime<Utc>,
}

/// Outcome of adding an agent to a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Added,
    Duplicate,
    ClusterRemoved,
}

impl Cluster {
    pub(crate) fn new(manifest: ClusterManifest) -> Self {
        let now = Utc::now();
        Self {
            manifest,
            created_at: now,
            state: RwLock::new(ClusterState {
                status: ClusterStatus::Pending,
                updated_at: now,
            }),
            agents: RwLock::new(HashMap::new()),
            removed: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.manifest.name()
    }

    pub fn manifest(&self) -> &ClusterManifest {
        &self.manifest
    }

    pub fn status(&self) -> ClusterStatus {
        self.state.read().status
    }

    pub(crate) fn set_status(&self, status: ClusterStatus) {
        let mut state = self.state.write();
        state.status = status;
        state.updated_at = Utc::now();
    }

    /// Move to `to` only if still in `from`
    pub(crate) fn transition(&self, from: ClusterStatus, to: ClusterStatus) -> bool {
        let mut state = self.state.write();
        if state.status != from {
            return false;
        }
        state.status = to;
        state.updated_at = Utc::now();
        true
    }

    pub fn agent(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.read().get(name).cloned()
    }

    pub fn agents(&self) -> Vec<Arc<Agent>> {
        self.agents.read().values().cloned().collect()
    }

    pub(crate) fn contains_agent(&self, name: &str) -> bool {
        self.agents.read().contains_key(name)
    }

    pub(crate) fn admit(&self, agent: Arc<Agent>) -> Admission {
        let mut agents = self.agents.write();
        if self.removed.is_cancelled() {
            return Admission::ClusterRemoved;
        }
        if agents.contains_key(agent.name()) {
            return Admission::Duplicate;
        }
        agents.insert(agent.name().to_string(), agent);
        Admission::Added
    }

    /// Mark removed and hand back every agent; later admissions are refused
    pub(crate) fn drain(&self) -> Vec<Arc<Agent>> {
        self.removed.cancel();
        self.agents.write().drain().map(|(_, agent)| agent).collect()
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.is_cancelled()
    }

    pub fn view(&self) -> ClusterView {
        let mut agents: Vec<AgentView> = self.agents().iter().map(|a| a.view()).collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));

        let state = self.state.read();
        ClusterView {
            name: self.manifest.metadata.name.clone(),
            namespace: self.manifest.metadata.namespace.clone(),
            labels: self.manifest.metadata.labels.clone(),
            status: state.status,
            created_at: self.created_at,
            updated_at: state.updated_at,
            agents,
        }
    }
}
