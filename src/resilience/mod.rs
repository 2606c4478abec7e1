//! # Resilience Module
//!
//! Per-destination fault isolation and admission control.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: stop routing to a destination after consecutive failures
//! - **Backpressure Gates**: bound the queued plus executing work per destination
//! - **Metrics Collection**: failure rates, rejections and state transitions
//!
//! ## Usage
//!
//! ```rust
//! use callosum_core::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! let breaker = CircuitBreaker::new("planner", CircuitBreakerConfig::default());
//!
//! if breaker.allow_request() {
//!     // invoke the destination, then report the outcome
//!     breaker.record_success();
//! }
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! ```

pub mod backpressure;
pub mod circuit_breaker;
pub mod config;
pub mod metrics;

pub use backpressure::{BackpressureGate, OverflowPolicy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState, TransitionListener};
pub use config::CircuitBreakerConfig;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
