//! Event types published on the [`EventBus`](crate::events::EventBus).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use crate::constants::events;

/// Bytes of the SHA-256 digest kept in an event id
const EVENT_ID_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "task.queued")]
    TaskQueued,
    #[serde(rename = "task.started")]
    TaskStarted,
    #[serde(rename = "task.retrying")]
    TaskRetrying,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.failed")]
    TaskFailed,
    #[serde(rename = "task.rejected")]
    TaskRejected,
    #[serde(rename = "circuit.state_changed")]
    CircuitStateChanged,
    #[serde(rename = "backpressure.triggered")]
    BackpressureTriggered,
    #[serde(rename = "result.reaped")]
    ResultReaped,
    #[serde(rename = "router.started")]
    RouterStarted,
    #[serde(rename = "router.degraded")]
    RouterDegraded,
    #[serde(rename = "router.shutdown")]
    RouterShutdown,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::TaskQueued,
        EventType::TaskStarted,
        EventType::TaskRetrying,
        EventType::TaskCompleted,
        EventType::TaskFailed,
        EventType::TaskRejected,
        EventType::CircuitStateChanged,
        EventType::BackpressureTriggered,
        EventType::ResultReaped,
        EventType::RouterStarted,
        EventType::RouterDegraded,
        EventType::RouterShutdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TaskQueued => events::TASK_QUEUED,
            EventType::TaskStarted => events::TASK_STARTED,
            EventType::TaskRetrying => events::TASK_RETRYING,
            EventType::TaskCompleted => events::TASK_COMPLETED,
            EventType::TaskFailed => events::TASK_FAILED,
            EventType::TaskRejected => events::TASK_REJECTED,
            EventType::CircuitStateChanged => events::CIRCUIT_STATE_CHANGED,
            EventType::BackpressureTriggered => events::BACKPRESSURE_TRIGGERED,
            EventType::ResultReaped => events::RESULT_REAPED,
            EventType::RouterStarted => events::ROUTER_STARTED,
            EventType::RouterDegraded => events::ROUTER_DEGRADED,
            EventType::RouterShutdown => events::ROUTER_SHUTDOWN,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Task lifecycle events (`task.*`)
    pub fn is_task_event(self) -> bool {
        self.as_str().starts_with("task.")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Hex SHA-256 of type, payload and timestamp, truncated to 16 bytes
    pub id: String,
    pub event_type: EventType,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self::at(event_type, payload, Utc::now())
    }

    /// Build an event with an explicit timestamp
    pub fn at(event_type: EventType, payload: Value, timestamp: DateTime<Utc>) -> Self {
        let id = Self::compute_id(event_type, &payload, &timestamp);
        Self {
            id,
            event_type,
            payload,
            timestamp,
        }
    }

    fn compute_id(event_type: EventType, payload: &Value, timestamp: &DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(event_type.as_str().as_bytes());
        hasher.update(payload.to_string().as_bytes());
        hasher.update(timestamp.to_rfc3339().as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..EVENT_ID_BYTES])
    }

    /// Convenience accessor for a string field of the payload
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Which events a subscription receives
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Types(HashSet<EventType>),
}

impl EventFilter {
    pub fn only<I: IntoIterator<Item = EventType>>(types: I) -> Self {
        EventFilter::Types(types.into_iter().collect())
    }

    pub fn matches(&self, event_type: EventType) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Types(types) => types.contains(&event_type),
        }
    }
}
