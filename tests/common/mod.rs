//! Shared helpers for integration tests: scripted consumers, gated
//! consumers and configuration builders.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use callosum_core::config::CallosumConfig;
use callosum_core::routing::{Consumer, ConsumerError};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

/// Defaults with fast retries, suitable for real-time tests
pub fn fast_config() -> CallosumConfig {
    let mut config = CallosumConfig::default();
    config.dispatch.retry_backoff_ms = 10;
    config.results.poll_initial_ms = 5;
    config.results.poll_max_ms = 20;
    config
}

/// Config with a small queue capacity and no retries
pub fn bounded_config(capacity: usize) -> CallosumConfig {
    let mut config = fast_config();
    config.backpressure.queue_capacity_per_destination = capacity;
    config.dispatch.max_retries = 0;
    config
}

/// Consumer whose outcome can be switched at runtime
#[derive(Debug, Default)]
pub struct ScriptedConsumer {
    failing: AtomicBool,
    calls: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedConsumer {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sleeps `delay` before answering
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Consumer for ScriptedConsumer {
    async fn execute(&self, payload: &Value, _deadline: Instant) -> Result<Value, ConsumerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            Err(ConsumerError::failed("scripted failure"))
        } else {
            Ok(payload.clone())
        }
    }
}

/// Consumer that records invocation order and blocks until released
#[derive(Debug)]
pub struct GatedConsumer {
    gate: Semaphore,
    started: Notify,
    seen: Mutex<Vec<Value>>,
}

impl GatedConsumer {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: Notify::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Let `n` blocked or future invocations finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Wait until an invocation has started
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Consumer for GatedConsumer {
    async fn execute(&self, payload: &Value, _deadline: Instant) -> Result<Value, ConsumerError> {
        self.seen.lock().push(payload.clone());
        self.started.notify_one();
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(ConsumerError::failed("gate closed")),
        }
        Ok(payload.clone())
    }
}
