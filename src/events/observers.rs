//! Built-in observers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::events::bus::Observer;
use crate::events::types::{Event, EventType};

/// Logs every event through `tracing`
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn on_event(&self, event: &Event) {
        match event.event_type {
            EventType::TaskFailed
            | EventType::TaskRejected
            | EventType::BackpressureTriggered
            | EventType::RouterDegraded => warn!(
                event_type = %event.event_type,
                event_id = %event.id,
                payload = %event.payload,
                "📡 EVENT"
            ),
            EventType::CircuitStateChanged
            | EventType::RouterStarted
            | EventType::RouterShutdown => info!(
                event_type = %event.event_type,
                event_id = %event.id,
                payload = %event.payload,
                "📡 EVENT"
            ),
            _ => debug!(
                event_type = %event.event_type,
                event_id = %event.id,
                payload = %event.payload,
                "📡 EVENT"
            ),
        }
    }
}

/// Snapshot produced by [`EventMetricsObserver::snapshot`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetricsSnapshot {
    pub counts: HashMap<String, u64>,
    pub completed_tasks: u64,
    pub mean_execution_ms: f64,
}

/// Counts events per type and tracks mean task execution latency
#[derive(Debug, Default)]
pub struct EventMetricsObserver {
    counts: DashMap<EventType, u64>,
    completed: AtomicU64,
    total_execution_ms: AtomicU64,
}

impl EventMetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, event_type: EventType) -> u64 {
        self.counts.get(&event_type).map(|c| *c).unwrap_or(0)
    }

    pub fn mean_execution_ms(&self) -> f64 {
        let completed = self.completed.load(Ordering::Relaxed);
        if completed == 0 {
            return 0.0;
        }
        self.total_execution_ms.load(Ordering::Relaxed) as f64 / completed as f64
    }

    pub fn snapshot(&self) -> EventMetricsSnapshot {
        EventMetricsSnapshot {
            counts: self
                .counts
                .iter()
                .map(|entry| (entry.key().as_str().to_string(), *entry.value()))
                .collect(),
            completed_tasks: self.completed.load(Ordering::Relaxed),
            mean_execution_ms: self.mean_execution_ms(),
        }
    }
}

impl Observer for EventMetricsObserver {
    fn on_event(&self, event: &Event) {
        *self.counts.entry(event.event_type).or_insert(0) += 1;

        if event.event_type == EventType::TaskCompleted {
            if let Some(ms) = event.payload.get("execution_time_ms").and_then(|v| v.as_u64()) {
                self.completed.fetch_add(1, Ordering::Relaxed);
                self.total_execution_ms.fetch_add(ms, Ordering::Relaxed);
            }
        }
    }
}

/// External knowledge store fed from router events
pub trait PatternStore: Send + Sync {
    fn record_pattern(&self, event: &Event);
}

/// Forwards task outcomes and breaker transitions to a [`PatternStore`]
pub struct PatternStoreObserver {
    store: Arc<dyn PatternStore>,
}

impl PatternStoreObserver {
    pub fn new(store: Arc<dyn PatternStore>) -> Self {
        Self { store }
    }

    fn is_pattern(event_type: EventType) -> bool {
        matches!(
            event_type,
            EventType::TaskCompleted | EventType::TaskFailed | EventType::CircuitStateChanged
        )
    }
}

impl Observer for PatternStoreObserver {
    fn on_event(&self, event: &Event) {
        if Self::is_pattern(event.event_type) {
            self.store.record_pattern(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_metrics_observer_counts_and_latency() {
        let observer = EventMetricsObserver::new();
        observer.on_event(&Event::new(EventType::TaskQueued, json!({})));
        observer.on_event(&Event::new(
            EventType::TaskCompleted,
            json!({"execution_time_ms": 10}),
        ));
        observer.on_event(&Event::new(
            EventType::TaskCompleted,
            json!({"execution_time_ms": 30}),
        ));

        assert_eq!(observer.count(EventType::TaskCompleted), 2);
        assert_eq!(observer.count(EventType::TaskFailed), 0);
        assert_eq!(observer.mean_execution_ms(), 20.0);

        let snapshot = observer.snapshot();
        assert_eq!(snapshot.counts.get("task.queued"), Some(&1));
        assert_eq!(snapshot.completed_tasks, 2);
    }

    #[derive(Default)]
    struct MemoryStore {
        patterns: Mutex<Vec<EventType>>,
    }

    impl PatternStore for MemoryStore {
        fn record_pattern(&self, event: &Event) {
            self.patterns.lock().push(event.event_type);
        }
    }

    #[test]
    fn test_pattern_store_observer_forwards_outcomes_only() {
        let store = Arc::new(MemoryStore::default());
        let observer = PatternStoreObserver::new(store.clone());

        observer.on_event(&Event::new(EventType::TaskQueued, json!({})));
        observer.on_event(&Event::new(EventType::TaskFailed, json!({})));
        observer.on_event(&Event::new(EventType::CircuitStateChanged, json!({})));

        assert_eq!(
            *store.patterns.lock(),
            vec![EventType::TaskFailed, EventType::CircuitStateChanged]
        );
    }

    #[test]
    fn test_logging_observer_accepts_every_type() {
        let observer = LoggingObserver;
        for event_type in EventType::ALL {
            observer.on_event(&Event::new(event_type, json!({})));
        }
    }
}
