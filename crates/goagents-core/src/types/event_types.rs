//! Lifecycle event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    #[serde(rename = "agent.started")]
    AgentStarted,
    #[serde(rename = "agent.stopped")]
    AgentStopped,
    #[serde(rename = "agent.failed")]
    AgentFailed,
    #[serde(rename = "agent.idle")]
    AgentIdle,
    #[serde(rename = "request.started")]
    RequestStarted,
    #[serde(rename = "request.ended")]
    RequestEnded,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentStarted => "agent.started",
            Self::AgentStopped => "agent.stopped",
            Self::AgentFailed => "agent.failed",
            Self::AgentIdle => "agent.idle",
            Self::RequestStarted => "request.started",
            Self::RequestEnded => "request.ended",
        }
    }
}

/// Lifecycle event published on the bounded event channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(event_type: EventType, agent_id: impl Into<String>) -> Self {
        Self {
            event_type,
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
