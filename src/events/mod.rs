//! # Event System
//!
//! Lifecycle events published by the router. Events carry no routing
//! semantics; the router behaves identically with zero subscribers.

pub mod bus;
pub mod history;
pub mod observers;
pub mod types;

pub use bus::{EventBus, EventBusStats, Observer, Subscription};
pub use history::EventHistory;
pub use observers::{
    EventMetricsObserver, EventMetricsSnapshot, LoggingObserver, PatternStore,
    PatternStoreObserver,
};
pub use types::{Event, EventFilter, EventType};
