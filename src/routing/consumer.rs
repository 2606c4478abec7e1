//! Consumer collaborator seam.
//!
//! A consumer executes the payload of a task for one destination. The router
//! only sees success, failure or a missed deadline.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;

use crate::routing::task::TaskError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerError {
    #[error("{0}")]
    Failed(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl ConsumerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Convert to the task-level error recorded in a result
    pub fn into_task_error(self, timeout: Duration) -> TaskError {
        match self {
            ConsumerError::Failed(message) => TaskError::ConsumerFailure { message },
            ConsumerError::DeadlineExceeded => TaskError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
        }
    }
}

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Execute `payload`, finishing before `deadline`.
    ///
    /// Futures still pending at the deadline are dropped by the caller.
    async fn execute(&self, payload: &Value, deadline: Instant) -> Result<Value, ConsumerError>;
}

/// Run one consumer attempt bounded by `deadline`.
///
/// A panicking consumer is reported as a failure of that attempt.
pub(crate) async fn invoke_with_deadline(
    consumer: &dyn Consumer,
    payload: &Value,
    deadline: Instant,
) -> Result<Value, ConsumerError> {
    let attempt = AssertUnwindSafe(consumer.execute(payload, deadline)).catch_unwind();
    match tokio::time::timeout_at(deadline, attempt).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(ConsumerError::failed("consumer panicked")),
        Err(_) => Err(ConsumerError::DeadlineExceeded),
    }
}

/// Adapter turning an async closure over an owned payload into a [`Consumer`]
pub struct FnConsumer<F, Fut> {
    handler: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnConsumer<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ConsumerError>> + Send,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Consumer for FnConsumer<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ConsumerError>> + Send,
{
    async fn execute(&self, payload: &Value, _deadline: Instant) -> Result<Value, ConsumerError> {
        (self.handler)(payload.clone()).await
    }
}

/// Build a consumer from an async closure
pub fn consumer_fn<F, Fut>(handler: F) -> FnConsumer<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ConsumerError>> + Send,
{
    FnConsumer::new(handler)
}
