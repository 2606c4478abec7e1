//! # Routing
//!
//! The router ("corpus callosum") and everything between a caller's task and
//! a destination's consumer.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use callosum_core::config::CallosumConfig;
//! use callosum_core::routing::{consumer_fn, RouterBuilder, Task};
//! use serde_json::{json, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let router = RouterBuilder::new(CallosumConfig::default())
//!     .register("planner", consumer_fn(|payload: Value| async move { Ok(payload) }))
//!     .start()
//!     .await?;
//!
//! let result = router
//!     .route_and_wait(Task::new("planner", json!({"goal": "draft"})).with_priority(4))
//!     .await;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod consumer;
pub(crate) mod dispatcher;
pub mod priority;
pub mod registry;
pub mod route;
pub mod router;
pub mod stats;
pub mod task;
pub mod transport;

pub use bootstrap::RouterBuilder;
pub use consumer::{consumer_fn, Consumer, ConsumerError, FnConsumer};
pub use priority::{classify, MessagePriority};
pub use registry::{Destination, DestinationRegistry};
pub use route::{QueuedTask, Route};
pub use router::{Router, RouterMode};
pub use stats::{DestinationStats, RouterStats};
pub use task::{Task, TaskError, TaskResult, TaskStatus};
pub use transport::{InProcessTransport, Transport};
