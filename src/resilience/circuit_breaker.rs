//! # Circuit Breaker Implementation
//!
//! Per-destination failure isolation with three states: Closed (normal
//! operation), Open (failing fast) and Half-Open (probing recovery).
//!
//! The breaker exposes a synchronous admission API (`allow_request`,
//! `record_success`, `record_failure`) used by the router, plus an async
//! [`CircuitBreaker::call`] wrapper for ad-hoc protection of a future.
//! All mutations serialize on one internal mutex; `state()` is a lock-free read.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - a limited number of probes are allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Errors returned by [`CircuitBreaker::call`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Callback invoked after every state transition with `(name, from, to)`
pub type TransitionListener = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probes_remaining: u32,
    metrics: CircuitBreakerMetrics,
}

/// Core circuit breaker implementation
pub struct CircuitBreaker {
    /// Destination name for logging and metrics
    name: String,

    /// Current circuit state, written only while `inner` is locked
    state: AtomicU8,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerInner>,

    listener: Option<TransitionListener>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            max_half_open_requests = config.max_half_open_requests,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                opened_at: None,
                half_open_probes_remaining: 0,
                metrics: CircuitBreakerMetrics::new(),
            }),
            listener: None,
        }
    }

    /// Attach a listener notified after each transition, outside the lock
    pub fn with_transition_listener(mut self, listener: TransitionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decide whether a request may proceed.
    ///
    /// An Open breaker whose recovery timeout has elapsed moves to HalfOpen
    /// here, and the call that observes the move consumes the first probe.
    pub fn allow_request(&self) -> bool {
        let (allowed, transition) = {
            let mut inner = self.inner.lock();
            match self.state() {
                CircuitState::Closed => (true, None),
                CircuitState::Open => {
                    let recovered = inner
                        .opened_at
                        .map(|opened| opened.elapsed() >= self.config.recovery_timeout)
                        .unwrap_or(true);
                    if recovered {
                        let transition = self.transition(&mut inner, CircuitState::HalfOpen);
                        (Self::take_probe(&mut inner), transition)
                    } else {
                        inner.metrics.rejected_count += 1;
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => (Self::take_probe(&mut inner), None),
            }
        };

        self.notify(transition);
        allowed
    }

    fn take_probe(inner: &mut BreakerInner) -> bool {
        if inner.half_open_probes_remaining > 0 {
            inner.half_open_probes_remaining -= 1;
            inner.metrics.half_open_calls += 1;
            true
        } else {
            inner.metrics.rejected_count += 1;
            false
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.metrics.total_calls += 1;
            inner.metrics.success_count += 1;

            match self.state() {
                CircuitState::Closed => {
                    inner.consecutive_failures = 0;
                    None
                }
                CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Closed),
                CircuitState::Open => {
                    debug!(component = %self.name, "Success recorded while circuit is open");
                    None
                }
            }
        };

        self.notify(transition);
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.metrics.total_calls += 1;
            inner.metrics.failure_count += 1;

            match self.state() {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        self.transition(&mut inner, CircuitState::Open)
                    } else {
                        None
                    }
                }
                // Any failure while probing reopens the circuit
                CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
                CircuitState::Open => None,
            }
        };

        self.notify(transition);
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Apply a transition while the lock is held; returns it for notification
    fn transition(
        &self,
        inner: &mut BreakerInner,
        to: CircuitState,
    ) -> Option<(CircuitState, CircuitState)> {
        let from = self.state();
        if from == to {
            return None;
        }

        match to {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.half_open_probes_remaining = 0;
                info!(
                    component = %self.name,
                    total_calls = inner.metrics.total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.half_open_probes_remaining = 0;
                error!(
                    component = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    failure_threshold = self.config.failure_threshold,
                    recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                    "🔴 Circuit breaker opened (failing fast)"
                );
            }
            CircuitState::HalfOpen => {
                inner.half_open_probes_remaining = self.config.max_half_open_requests;
                info!(
                    component = %self.name,
                    probes = self.config.max_half_open_requests,
                    "🟡 Circuit breaker half-open (testing recovery)"
                );
            }
        }

        inner.metrics.state_transitions += 1;
        self.state.store(to as u8, Ordering::Release);
        Some((from, to))
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        if let (Some((from, to)), Some(listener)) = (transition, &self.listener) {
            listener(&self.name, from, to);
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let transition = {
            let mut inner = self.inner.lock();
            let transition = self.transition(&mut inner, CircuitState::Open);
            // Re-forcing an open breaker restarts its recovery window
            inner.opened_at = Some(Instant::now());
            transition
        };
        self.notify(transition);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let transition = {
            let mut inner = self.inner.lock();
            inner.consecutive_failures = 0;
            self.transition(&mut inner, CircuitState::Closed)
        };
        self.notify(transition);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let mut snapshot = inner.metrics.clone();

        snapshot.current_state = self.state();
        snapshot.consecutive_failures = inner.consecutive_failures;

        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
            snapshot.success_rate = snapshot.success_count as f64 / snapshot.total_calls as f64;
        }

        snapshot
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn half_open_probes_remaining(&self) -> u32 {
        self.inner.lock().half_open_probes_remaining
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let inner = self.inner.lock();
        if inner.metrics.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        let failure_rate = inner.metrics.failure_count as f64 / inner.metrics.total_calls as f64;
        failure_rate < 0.1
    }
}
