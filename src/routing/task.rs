//! Task and result types carried through the router.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::defaults;
use crate::routing::priority::{classify, MessagePriority};

/// A unit of work addressed to one destination tract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique per in-flight task; generated when left empty
    pub id: String,
    pub destination: String,
    pub payload: Value,
    /// 1 (low) to 5 (critical)
    pub priority: u8,
    /// Caller wait budget, also the deadline of each consumer attempt
    pub timeout: Duration,
}

impl Task {
    pub fn new(destination: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            destination: destination.into(),
            payload,
            priority: defaults::TASK_PRIORITY,
            timeout: Duration::from_millis(defaults::TASK_TIMEOUT_MS),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message_priority(&self) -> MessagePriority {
        classify(self.priority)
    }

    /// Give the task a generated id if the caller left it empty
    pub(crate) fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Why a task did not complete
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("Circuit breaker open for destination '{destination}'")]
    CircuitOpen { destination: String },

    #[error("Destination '{destination}' is at capacity ({capacity})")]
    Backpressure { destination: String, capacity: usize },

    #[error("Consumer failed: {message}")]
    ConsumerFailure { message: String },

    #[error("Consumer exceeded its deadline of {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Router unavailable: {reason}")]
    RouterUnavailable { reason: String },

    #[error("Unknown destination '{destination}'")]
    UnknownDestination { destination: String },

    #[error("Task '{task_id}' is already in flight")]
    DuplicateTask { task_id: String },

    #[error("Router is shutting down")]
    Shutdown,
}

impl TaskError {
    /// Transient errors are retried by the dispatcher
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TaskError::ConsumerFailure { .. } | TaskError::Timeout { .. }
        )
    }

    /// Rejected before reaching a route
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            TaskError::CircuitOpen { .. }
                | TaskError::Backpressure { .. }
                | TaskError::UnknownDestination { .. }
                | TaskError::DuplicateTask { .. }
                | TaskError::Shutdown
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::CircuitOpen { .. } => "circuit_open",
            TaskError::Backpressure { .. } => "backpressure",
            TaskError::ConsumerFailure { .. } => "consumer_failure",
            TaskError::Timeout { .. } => "timeout",
            TaskError::RouterUnavailable { .. } => "router_unavailable",
            TaskError::UnknownDestination { .. } => "unknown_destination",
            TaskError::DuplicateTask { .. } => "duplicate_task",
            TaskError::Shutdown => "shutdown",
        }
    }
}

/// Final outcome of a task, written to the result store exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub output: Value,
    pub error: Option<TaskError>,
    pub execution_time: Duration,
    /// Consumer invocations made; zero for admission rejections
    pub attempts: u32,
}

impl TaskResult {
    pub fn completed(
        task_id: impl Into<String>,
        output: Value,
        execution_time: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            output,
            error: None,
            execution_time,
            attempts,
        }
    }

    pub fn failed(
        task_id: impl Into<String>,
        error: TaskError,
        execution_time: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            output: Value::Null,
            error: Some(error),
            execution_time,
            attempts,
        }
    }

    /// Admission rejection: nothing ran
    pub fn rejected(task_id: impl Into<String>, error: TaskError) -> Self {
        Self::failed(task_id, error, Duration::ZERO, 0)
    }

    /// The caller stopped waiting; the task may still finish in the background
    pub fn timed_out(task_id: impl Into<String>, waited: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::TimedOut,
            output: Value::Null,
            error: None,
            execution_time: waited,
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
