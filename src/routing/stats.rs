//! Point-in-time router statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

use crate::constants::PRIORITY_LANES;
use crate::events::EventBusStats;
use crate::resilience::{CircuitState, SystemCircuitBreakerMetrics};
use crate::routing::registry::Destination;
use crate::routing::router::RouterMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationStats {
    pub name: String,
    pub breaker_state: CircuitState,
    /// Queue depth per lane, lowest priority first
    pub lane_depths: [usize; PRIORITY_LANES],
    pub queue_depth: usize,
    /// Admitted tasks not yet settled (queued plus executing)
    pub in_flight: usize,
    pub capacity: usize,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub retries: u64,
}

impl DestinationStats {
    pub(crate) fn collect(destination: &Destination) -> Self {
        let counters = &destination.counters;
        let lane_depths = destination.route.lane_depths();
        Self {
            name: destination.name.clone(),
            breaker_state: destination.breaker.state(),
            queue_depth: lane_depths.iter().sum(),
            lane_depths,
            in_flight: destination.gate.in_flight(),
            capacity: destination.gate.capacity(),
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStats {
    pub mode: RouterMode,
    pub transport: String,
    pub accepting: bool,
    pub destinations: Vec<DestinationStats>,
    /// Task ids currently reserved by admitted tasks
    pub in_flight_tasks: usize,
    /// Results stored and not yet claimed
    pub pending_results: usize,
    pub events: EventBusStats,
    pub circuit_breakers: SystemCircuitBreakerMetrics,
}

impl RouterStats {
    pub fn destination(&self, name: &str) -> Option<&DestinationStats> {
        self.destinations.iter().find(|d| d.name == name)
    }

    pub fn total_queue_depth(&self) -> usize {
        self.destinations.iter().map(|d| d.queue_depth).sum()
    }

    pub fn health_score(&self) -> f64 {
        self.circuit_breakers.health_score()
    }

    /// One-line summary for logging
    pub fn format_summary(&self) -> String {
        format!(
            "Mode: {} | Destinations: {} | Queued: {} | In flight: {} | Pending results: {} | {}",
            self.mode,
            self.destinations.len(),
            self.total_queue_depth(),
            self.in_flight_tasks,
            self.pending_results,
            self.circuit_breakers.format_summary()
        )
    }
}
