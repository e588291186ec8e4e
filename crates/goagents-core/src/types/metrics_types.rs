//! System-wide metric snapshot

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Copy of the engine counters taken under the metrics lock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub clusters_total: u64,
    pub agents_total: u64,
    pub requests_total: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    /// Damped `(avg + latest) / 2`, not a moving average
    #[serde(with = "crate::config::duration")]
    pub average_response_time: Duration,
    pub events_dropped: u64,
    pub clusters_active: u64,
    pub agents_active: u64,
}
