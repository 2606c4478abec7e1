//! # System Constants
//!
//! Event names, default tunables and operational limits for the router.
//!
//! Everything here is a plain constant; the typed configuration in
//! [`crate::config`] uses these as its defaults so the two never drift.

/// Lifecycle event names published on the event bus
pub mod events {
    // Task lifecycle events
    pub const TASK_QUEUED: &str = "task.queued";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_RETRYING: &str = "task.retrying";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_REJECTED: &str = "task.rejected";

    // Resilience events
    pub const CIRCUIT_STATE_CHANGED: &str = "circuit.state_changed";
    pub const BACKPRESSURE_TRIGGERED: &str = "backpressure.triggered";

    // Result store events
    pub const RESULT_REAPED: &str = "result.reaped";

    // Router lifecycle events
    pub const ROUTER_STARTED: &str = "router.started";
    pub const ROUTER_DEGRADED: &str = "router.degraded";
    pub const ROUTER_SHUTDOWN: &str = "router.shutdown";
}

/// Default values for every recognized configuration option
pub mod defaults {
    pub const FAILURE_THRESHOLD: u32 = 5;
    pub const RECOVERY_TIMEOUT_MS: u64 = 60_000;
    pub const MAX_HALF_OPEN_REQUESTS: u32 = 3;

    pub const QUEUE_CAPACITY_PER_DESTINATION: usize = 1000;

    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BACKOFF_MS: u64 = 1_000;
    pub const MAX_CONCURRENT_DISPATCHES: usize = 1;

    pub const RESULT_TTL_MS: u64 = 300_000;
    pub const REAPER_INTERVAL_MS: u64 = 30_000;
    pub const POLL_INITIAL_MS: u64 = 50;
    pub const POLL_MULTIPLIER: f64 = 1.5;
    pub const POLL_MAX_MS: u64 = 1_000;

    pub const ROUTER_STARTUP_TIMEOUT_MS: u64 = 10_000;
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

    pub const TASK_TIMEOUT_MS: u64 = 30_000;
    pub const TASK_PRIORITY: u8 = 2;

    pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1000;
    pub const HISTORY_CAPACITY: usize = 10_000;
    pub const HISTORY_WINDOW_MS: u64 = 3_600_000;
}

/// Hard limits used by configuration validation
pub mod limits {
    pub const MAX_FAILURE_THRESHOLD: u32 = 100;
    pub const MAX_HALF_OPEN_REQUESTS: u32 = 50;
    pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;
    pub const MAX_RETRIES: u32 = 20;
}

/// Number of strict-priority lanes per route
pub const PRIORITY_LANES: usize = 5;

/// Lowest and highest accepted task priority
pub const MIN_TASK_PRIORITY: u8 = 1;
pub const MAX_TASK_PRIORITY: u8 = 5;
