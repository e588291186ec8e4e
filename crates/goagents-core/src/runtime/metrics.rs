//! System-wide counters

use crate::types::{damped_average, MetricsSnapshot};
use parking_lot::RwLock;
use std::time::Duration;

/// Monotonic engine counters behind their own lock
#[derive(Default)]
pub struct SystemMetrics {
    counters: RwLock<Counters>,
}

#[derive(Default)]
struct Counters {
    clusters_total: u64,
    agents_total: u64,
    requests_total: u64,
    requests_succeeded: u64,
    requests_failed: u64,
    average_response_time: Duration,
}

impl SystemMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cluster_deployed(&self) {
        self.counters.write().clusters_total += 1;
    }

    pub fn agent_created(&self) {
        self.counters.write().agents_total += 1;
    }

    pub fn request_started(&self) {
        self.counters.write().requests_total += 1;
    }

    /// Record a request previously counted by `request_started`.
    ///
    /// Only successful requests feed the average response time.
    pub fn record_outcome(&self, success: bool, latency: Duration) {
        let mut counters = self.counters.write();
        if success {
            counters.requests_succeeded += 1;
            counters.average_response_time =
                damped_average(counters.average_response_time, latency);
        } else {
            counters.requests_failed += 1;
        }
    }

    /// Copy of the counters; gauges are left at zero for the caller to fill
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read();
        MetricsSnapshot {
            clusters_total: counters.clusters_total,
            agents_total: counters.agents_total,
            requests_total: counters.requests_total,
            requests_succeeded: counters.requests_succeeded,
            requests_failed: counters.requests_failed,
            average_response_time: counters.average_response_time,
            ..Default::default()
        }
    }
}
