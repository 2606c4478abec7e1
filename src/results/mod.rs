//! # Result Delivery
//!
//! Outcomes flow from dispatchers to callers through [`ResultStore`]. Waiters
//! poll with [`PollBackoff`]; unclaimed results are swept by [`ResultReaper`].

pub mod backoff;
pub mod reaper;
pub mod store;

pub use backoff::PollBackoff;
pub use reaper::ResultReaper;
pub use store::{ResultStore, ResultStoreError};
