//! Per-agent background supervision: startup, idle detection, shutdown

use super::events::EventBus;
use super::instance::Agent;
use crate::types::{AgentStatus, Event, EventType};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Stand-in for deadlines that would overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + after`, saturating to a deadline that never arrives in practice
pub(crate) fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Spawn the supervisor for one run of `agent`
pub(crate) fn spawn(agent: Arc<Agent>, run: u64, token: CancellationToken, events: Arc<EventBus>) {
    let task = supervise(agent.clone(), run, token, events.clone());
    spawn_guarded(agent, run, events, task);
}

/// Run `task` in the background, turning a panic into a failed agent
pub(crate) fn spawn_guarded<F>(agent: Arc<Agent>, run: u64, events: Arc<EventBus>, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(task);
    tokio::spawn(async move {
        let Err(e) = handle.await else {
            return;
        };
        let message = if e.is_panic() {
            format!("supervisor panicked: {}", panic_message(e.into_panic()))
        } else {
            "supervisor task cancelled".to_string()
        };
        error!(agent_id = %agent.id(), error = %message, "Agent supervision failed");
        if agent.fail(run, message.clone()) {
            events.publish(Event::new(EventType::AgentFailed, agent.id()).with_data("error", message));
        }
    });
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn supervise(agent: Arc<Agent>, run: u64, token: CancellationToken, events: Arc<EventBus>) {
    if token.is_cancelled()
        || !agent.transition(run, AgentStatus::Starting, AgentStatus::Running)
    {
        finish(&agent, run, &events);
        return;
    }

    // Starting counts as activity so a long-pending agent is not idle on arrival
    agent.touch();
    info!(agent_id = %agent.id(), name = %agent.name(), cluster = %agent.cluster(), "Agent started");
    events.publish(Event::new(EventType::AgentStarted, agent.id()));

    let idle_timeout = agent.config().effective_idle_timeout();
    let mut deadline = deadline_after(agent.last_activity_instant(), idle_timeout);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                finish(&agent, run, &events);
                return;
            }
            _ = sleep_until(deadline) => {
                let now = Instant::now();
                let last_activity = agent.last_activity_instant();
                if now.duration_since(last_activity) >= idle_timeout {
                    if agent.transition(run, AgentStatus::Running, AgentStatus::Idle) {
                        info!(agent_id = %agent.id(), idle_for = ?now.duration_since(last_activity), "Agent idle");
                        events.publish(Event::new(EventType::AgentIdle, agent.id()));
                    }
                    deadline = deadline_after(now, idle_timeout);
                } else {
                    if agent.transition(run, AgentStatus::Idle, AgentStatus::Running) {
                        debug!(agent_id = %agent.id(), "Agent resumed from idle");
                    }
                    deadline = deadline_after(last_activity, idle_timeout);
                }
            }
        }
    }
}

fn finish(agent: &Agent, run: u64, events: &EventBus) {
    if agent.finish_stop(run) {
        info!(agent_id = %agent.id(), "Agent stopped");
        events.publish(Event::new(EventType::AgentStopped, agent.id()));
    }
}
