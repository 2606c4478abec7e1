#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Callosum Core
//!
//! Asynchronous message router that dispatches tasks between logical
//! partitions ("tracts"), isolates failing destinations with circuit
//! breakers, bounds admitted work with backpressure, and hands results back
//! to callers through a polled result store.
//!
//! ## Architecture
//!
//! A task flows through the [`routing::Router`]:
//!
//! 1. its priority is classified into one of five lanes
//! 2. admission checks the destination's circuit breaker and backpressure gate
//! 3. the task is queued on the destination's route
//! 4. the destination's dispatcher invokes the consumer, retrying transient failures
//! 5. the outcome lands in the [`results::ResultStore`] where the caller picks it up
//!
//! Lifecycle events are published on an [`events::EventBus`] and never
//! influence routing.
//!
//! ## Module Organization
//!
//! - [`routing`] - Router, dispatchers, routes, tasks and the consumer seam
//! - [`resilience`] - Circuit breakers, backpressure gates and their metrics
//! - [`results`] - Result store, poll backoff and the reaper
//! - [`events`] - Event bus, history and built-in observers
//! - [`config`] - Layered YAML and environment configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Crate-level errors
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod resilience;
pub mod results;
pub mod routing;

pub use config::{CallosumConfig, ConfigManager};
pub use error::{CallosumError, Result};
pub use events::{Event, EventBus, EventFilter, EventType, Observer, PatternStore};
pub use resilience::{BackpressureGate, CircuitBreaker, CircuitState, OverflowPolicy};
pub use results::ResultStore;
pub use routing::{
    Consumer, ConsumerError, MessagePriority, Router, RouterBuilder, RouterMode, Task, TaskError,
    TaskResult, TaskStatus, Transport,
};
