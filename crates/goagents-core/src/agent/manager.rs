//! Agent lifecycle manager

use super::events::EventBus;
use super::instance::Agent;
use super::supervisor;
use crate::config::RuntimeConfig;
use crate::error::{AgentError, Error, Result};
use crate::types::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Owns every agent instance and drives its state machine
pub struct AgentManager {
    agents: RwLock<HashMap<String, Arc<Agent>>>,
    events: Arc<EventBus>,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl AgentManager {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            events: Arc::new(EventBus::new(config.event_buffer)),
            startup_timeout: config.startup_timeout,
            poll_interval: config.startup_poll_interval,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a new agent in `pending`
    pub fn create(
        &self,
        name: impl Into<String>,
        cluster: impl Into<String>,
        config: AgentConfig,
    ) -> Result<Arc<Agent>> {
        config.validate()?;

        let id = format!("agent-{}", Uuid::new_v4().simple());
        let agent = Arc::new(Agent::new(id.clone(), name, cluster, config));
        info!(
            agent_id = %id,
            name = %agent.name(),
            cluster = %agent.cluster(),
            provider = %agent.config().provider,
            "Created agent"
        );

        self.agents.write().insert(id, agent.clone());
        Ok(agent)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Agent>> {
        self.agents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Agent(AgentError::NotFound(id.to_string())))
    }

    pub fn list(&self) -> Vec<Arc<Agent>> {
        self.agents.read().values().cloned().collect()
    }

    pub fn status(&self, id: &str) -> Result<AgentStatus> {
        Ok(self.get(id)?.status())
    }

    /// Record activity on an agent without issuing a request
    pub fn touch(&self, id: &str) -> Result<()> {
        self.get(id)?.touch();
        Ok(())
    }

    /// `pending|stopped -> starting` and spawn the supervisor.
    ///
    /// A no-op on agents that are already running or idle.
    pub fn start(&self, id: &str) -> Result<()> {
        let agent = self.get(id)?;
        let (run, token) = match agent.begin_start() {
            Ok(started) => started,
            Err(status) if status.is_servable() => return Ok(()),
            Err(status) => {
                return Err(Error::Agent(AgentError::InvalidState {
                    id: id.to_string(),
                    status,
                    operation: "start",
                }))
            }
        };

        debug!(agent_id = %id, run, "Starting agent");
        supervisor::spawn(agent, run, token, self.events.clone());
        Ok(())
    }

    /// Request a stop; idempotent on stopping or stopped agents
    pub fn stop(&self, id: &str) -> Result<()> {
        let agent = self.get(id)?;
        self.stop_agent(&agent);
        Ok(())
    }

    /// Stop and forget an agent
    pub fn delete(&self, id: &str) -> Result<()> {
        let agent = self
            .agents
            .write()
            .remove(id)
            .ok_or_else(|| Error::Agent(AgentError::NotFound(id.to_string())))?;
        self.stop_agent(&agent);
        info!(agent_id = %id, "Deleted agent");
        Ok(())
    }

    /// Stop every agent without removing it
    pub fn stop_all(&self) {
        for agent in self.list() {
            self.stop_agent(&agent);
        }
    }

    fn stop_agent(&self, agent: &Agent) {
        match agent.begin_stop() {
            AgentStatus::Pending | AgentStatus::Failed => {
                info!(agent_id = %agent.id(), "Agent stopped");
                self.events.publish(Event::new(EventType::AgentStopped, agent.id()));
            }
            AgentStatus::Stopping | AgentStatus::Stopped => {}
            previous => debug!(agent_id = %agent.id(), from = %previous, "Stopping agent"),
        }
    }

    /// Poll until the agent reports `status` or the timeout passes
    pub async fn wait_for_status(&self, id: &str, status: AgentStatus, timeout: Duration) -> Result<()> {
        let agent = self.get(id)?;
        let deadline = supervisor::deadline_after(Instant::now(), timeout);
        while agent.status() != status {
            if Instant::now() >= deadline {
                return Err(Error::Internal(format!(
                    "agent {} still {} after {:?}, expected {}",
                    id,
                    agent.status(),
                    timeout,
                    status
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    /// Start the agent on demand and wait, bounded, until it can serve
    pub async fn ensure_running(&self, id: &str) -> Result<Arc<Agent>> {
        let agent = self.get(id)?;
        if agent.status().is_servable() {
            return Ok(agent);
        }

        let deadline = supervisor::deadline_after(Instant::now(), self.startup_timeout);
        loop {
            match agent.status() {
                status if status.is_servable() => return Ok(agent),
                AgentStatus::Failed => {
                    return Err(Error::Agent(AgentError::InvalidState {
                        id: id.to_string(),
                        status: AgentStatus::Failed,
                        operation: "serve requests",
                    }))
                }
                status if status.can_start() => match self.start(id) {
                    Ok(()) => {}
                    // Another caller won the race to start it
                    Err(Error::Agent(AgentError::InvalidState { .. })) => {}
                    Err(e) => return Err(e),
                },
                _ => {}
            }

            if Instant::now() >= deadline {
                warn!(agent_id = %id, status = %agent.status(), "Agent did not become ready");
                return Err(Error::Agent(AgentError::StartupTimeout {
                    id: id.to_string(),
                    timeout: self.startup_timeout,
                }));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Serve one request on an agent.
    ///
    /// Starts the agent if needed, counts the request, then hands the agent
    /// and its cancellation token to `dispatch`. A soft-failure response is
    /// counted as failed and returned as-is.
    pub async fn process_request<F, Fut>(
        &self,
        id: &str,
        request_id: &str,
        dispatch: F,
    ) -> Result<Response>
    where
        F: FnOnce(Arc<Agent>, CancellationToken) -> Fut,
        Fut: Future<Output = Response>,
    {
        let agent = self.ensure_running(id).await?;
        let token = agent.cancel_token();

        agent.begin_request();
        self.events.publish(
            Event::new(EventType::RequestStarted, agent.id()).with_data("requestId", request_id),
        );

        let started = Instant::now();
        let response = dispatch(agent.clone(), token).await;
        let latency = started.elapsed();
        let success = !response.is_soft_failure();

        agent.record_outcome(success, latency);
        if success {
            agent.touch();
        }

        debug!(
            agent_id = %agent.id(),
            request_id = %request_id,
            success,
            latency_ms = latency.as_millis() as u64,
            "Request completed"
        );
        self.events.publish(
            Event::new(EventType::RequestEnded, agent.id())
                .with_data("requestId", request_id)
                .with_data("success", success),
        );

        Ok(response)
    }
}
