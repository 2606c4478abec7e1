//! Destination registry.
//!
//! Built once when the router starts and immutable afterwards; every
//! dispatcher holds an `Arc` to its own [`Destination`].

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::CallosumConfig;
use crate::error::{CallosumError, Result};
use crate::events::{EventBus, EventType};
use crate::resilience::{BackpressureGate, CircuitBreaker, CircuitState};
use crate::routing::consumer::Consumer;
use crate::routing::route::Route;

/// Monotonic per-destination counters
#[derive(Debug, Default)]
pub struct DestinationCounters {
    pub dispatched: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub rejected: AtomicU64,
    pub retries: AtomicU64,
}

impl DestinationCounters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything the router keeps for one destination tract
pub struct Destination {
    pub name: String,
    pub breaker: CircuitBreaker,
    pub gate: BackpressureGate,
    pub route: Route,
    pub consumer: Arc<dyn Consumer>,
    pub counters: DestinationCounters,
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.name)
            .field("breaker", &self.breaker)
            .field("gate", &self.gate)
            .field("route_depth", &self.route.depth())
            .finish()
    }
}

impl Destination {
    pub fn new(
        name: impl Into<String>,
        consumer: Arc<dyn Consumer>,
        config: &CallosumConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let name = name.into();

        let breaker = CircuitBreaker::new(name.clone(), config.circuit_breaker.to_resilience_config())
            .with_transition_listener(Arc::new(
                move |destination: &str, from: CircuitState, to: CircuitState| {
                    events.emit(
                        EventType::CircuitStateChanged,
                        json!({
                            "destination": destination,
                            "from": from.to_string(),
                            "to": to.to_string(),
                        }),
                    );
                },
            ));

        Self {
            gate: BackpressureGate::new(
                name.clone(),
                config.backpressure.queue_capacity_per_destination,
            ),
            route: Route::new(name.clone()),
            breaker,
            consumer,
            counters: DestinationCounters::default(),
            name,
        }
    }
}

#[derive(Debug, Default)]
pub struct DestinationRegistry {
    destinations: HashMap<String, Arc<Destination>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination; names must be unique
    pub fn insert(&mut self, destination: Destination) -> Result<()> {
        if destination.name.is_empty() {
            return Err(CallosumError::RegistrationError(
                "destination name must not be empty".to_string(),
            ));
        }
        if self.destinations.contains_key(&destination.name) {
            return Err(CallosumError::RegistrationError(format!(
                "destination '{}' registered twice",
                destination.name
            )));
        }
        self.destinations
            .insert(destination.name.clone(), Arc::new(destination));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Destination>> {
        self.destinations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.destinations.contains_key(name)
    }

    /// Destination names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.destinations.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Destination>> {
        self.destinations.values()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}
