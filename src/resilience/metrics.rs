//! # Breaker Snapshots
//!
//! Point-in-time counters for each destination's breaker. [`RouterStats`]
//! carries one snapshot per destination, and the aggregate decides whether
//! the router reports itself healthy.
//!
//! [`RouterStats`]: crate::routing::RouterStats

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of one destination's breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Consumer outcomes the breaker has counted
    pub total_calls: u64,

    pub success_count: u64,

    /// Tasks that exhausted their retries
    pub failure_count: u64,

    /// Admissions refused with `CircuitOpen`
    pub rejected_count: u64,

    /// Failed tasks since the last success
    pub consecutive_failures: u32,

    /// Trial tasks admitted while half-open
    pub half_open_calls: u64,

    pub state_transitions: u64,

    pub current_state: CircuitState,

    /// `failure_count / total_calls`, zero before the first outcome
    pub failure_rate: f64,

    pub success_rate: f64,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            state_transitions: 0,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
        }
    }

    /// A closed breaker counts as healthy below a 10% failure rate; a
    /// half-open one is given the benefit of the doubt
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "closed, admitting tasks",
            CircuitState::Open => "open, rejecting tasks",
            CircuitState::HalfOpen => "half-open, admitting trial tasks",
        }
    }

    /// One-line form used in the router's stats log
    pub fn format_summary(&self) -> String {
        format!(
            "{} | outcomes={} success={:.1}% failures={} rejected={}",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.rejected_count
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Breaker snapshots for every registered destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Keyed by destination name
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,

    /// When the last snapshot was added
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: chrono::Utc::now(),
        }
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
        self.collected_at = chrono::Utc::now();
    }

    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }
        counts
    }

    /// Destinations whose breaker is not healthy
    pub fn unhealthy_circuits(&self) -> Vec<(&String, &CircuitBreakerMetrics)> {
        self.circuit_breakers
            .iter()
            .filter(|(_, metrics)| !metrics.is_healthy())
            .collect()
    }

    /// Fraction of destinations with a healthy breaker; 1.0 with none registered
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.total_calls).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.failure_count).sum()
    }

    /// Failed tasks over counted outcomes across all destinations
    pub fn system_failure_rate(&self) -> f64 {
        let total_calls = self.total_calls();
        if total_calls == 0 {
            return 0.0;
        }
        self.total_failures() as f64 / total_calls as f64
    }

    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let count = |state| state_counts.get(&state).copied().unwrap_or(0);

        format!(
            "breakers={} closed={} open={} half_open={} health={:.1}% failure_rate={:.2}%",
            self.circuit_breakers.len(),
            count(CircuitState::Closed),
            count(CircuitState::Open),
            count(CircuitState::HalfOpen),
            self.health_score() * 100.0,
            self.system_failure_rate() * 100.0
        )
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
