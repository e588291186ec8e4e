//! A managed agent and its mutable runtime state

use crate::types::{AgentConfig, AgentMetrics, AgentStatus, AgentView};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One logical agent worker.
///
/// Identity and config are fixed at creation; status, activity and metrics
/// sit behind a single lock so every update is atomic with respect to readers.
pub struct Agent {
    id: String,
    name: String,
    cluster: String,
    config: AgentConfig,
    created_at: DateTime<Utc>,
    state: RwLock<AgentState>,
}

struct AgentState {
    status: AgentStatus,
    updated_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Monotonic twin of `last_activity`, read by the idle supervisor
    last_activity_at: Instant,
    error_message: Option<String>,
    metrics: AgentMetrics,
    cancel: CancellationToken,
    /// Incremented on every start so a stale supervisor cannot touch a newer run
    run: u64,
}

impl Agent {
    pub(crate) fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cluster: impl Into<String>,
        config: AgentConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            cluster: cluster.into(),
            config,
            created_at: now,
            state: RwLock::new(AgentState {
                status: AgentStatus::Pending,
                updated_at: now,
                last_activity: now,
                last_activity_at: Instant::now(),
                error_message: None,
                metrics: AgentMetrics::default(),
                cancel: CancellationToken::new(),
                run: 0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> AgentStatus {
        self.state.read().status
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.state.read().last_activity
    }

    pub fn error_message(&self) -> Option<String> {
        self.state.read().error_message.clone()
    }

    /// Copy of the request counters
    pub fn metrics(&self) -> AgentMetrics {
        self.state.read().metrics.clone()
    }

    /// Token observed by the supervisor and by in-flight provider calls
    pub fn cancel_token(&self) -> CancellationToken {
        self.state.read().cancel.clone()
    }

    /// Record activity; never moves the timestamp backwards
    pub fn touch(&self) {
        let mut state = self.state.write();
        let now = Utc::now();
        if now > state.last_activity {
            state.last_activity = now;
        }
        let now = Instant::now();
        if now > state.last_activity_at {
            state.last_activity_at = now;
        }
    }

    pub fn view(&self) -> AgentView {
        let state = self.state.read();
        AgentView {
            id: self.id.clone(),
            name: self.name.clone(),
            cluster: self.cluster.clone(),
            status: state.status,
            provider: self.config.provider.clone(),
            model: self.config.model.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
            last_activity: state.last_activity,
            error_message: state.error_message.clone(),
            metrics: state.metrics.clone(),
        }
    }

    pub(crate) fn last_activity_instant(&self) -> Instant {
        self.state.read().last_activity_at
    }

    /// `pending|stopped -> starting` with a fresh cancellation token.
    ///
    /// Returns the new run number and token, or the blocking status.
    pub(crate) fn begin_start(&self) -> Result<(u64, CancellationToken), AgentStatus> {
        let mut state = self.state.write();
        if !state.status.can_start() {
            return Err(state.status);
        }
        state.run += 1;
        state.cancel = CancellationToken::new();
        state.error_message = None;
        Self::set_status(&mut state, AgentStatus::Starting);
        Ok((state.run, state.cancel.clone()))
    }

    /// Request a stop. Returns the status observed before the call.
    ///
    /// Agents without a live supervisor (`pending`, `failed`) go straight to
    /// `stopped`; supervised ones move to `stopping` and their token fires.
    pub(crate) fn begin_stop(&self) -> AgentStatus {
        let mut state = self.state.write();
        let previous = state.status;
        match previous {
            AgentStatus::Stopped | AgentStatus::Stopping => {}
            AgentStatus::Pending | AgentStatus::Failed => {
                Self::set_status(&mut state, AgentStatus::Stopped);
            }
            AgentStatus::Starting | AgentStatus::Running | AgentStatus::Idle => {
                Self::set_status(&mut state, AgentStatus::Stopping);
                state.cancel.cancel();
            }
        }
        previous
    }

    /// Compare-and-set on status, scoped to one supervision run
    pub(crate) fn transition(&self, run: u64, from: AgentStatus, to: AgentStatus) -> bool {
        let mut state = self.state.write();
        if state.run != run || state.status != from {
            return false;
        }
        Self::set_status(&mut state, to);
        true
    }

    /// Supervisor exit path: `stopping` (or an aborted `starting`) becomes `stopped`
    pub(crate) fn finish_stop(&self, run: u64) -> bool {
        let mut state = self.state.write();
        if state.run != run {
            return false;
        }
        match state.status {
            AgentStatus::Stopping | AgentStatus::Starting => {
                Self::set_status(&mut state, AgentStatus::Stopped);
                true
            }
            _ => false,
        }
    }

    /// Mark the run failed unless it already stopped
    pub(crate) fn fail(&self, run: u64, message: impl Into<String>) -> bool {
        let mut state = self.state.write();
        if state.run != run || state.status == AgentStatus::Stopped {
            return false;
        }
        state.error_message = Some(message.into());
        state.cancel.cancel();
        Self::set_status(&mut state, AgentStatus::Failed);
        true
    }

    /// Count a request as received and refresh activity
    pub(crate) fn begin_request(&self) {
        {
            let mut state = self.state.write();
            state.metrics.requests_total += 1;
        }
        self.touch();
    }

    pub(crate) fn record_outcome(&self, success: bool, latency: Duration) {
        self.state.write().metrics.record_outcome(success, latency);
    }

    fn set_status(state: &mut AgentState, status: AgentStatus) {
        state.status = status;
        state.updated_at = Utc::now();
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cluster", &self.cluster)
            .field("status", &self.status())
            .finish()
    }
}
