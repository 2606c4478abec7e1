//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single circuit breaker. The file-backed form
//! lives in [`crate::config::CircuitBreakerSettings`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, limits};

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to stay open before probing the destination again
    pub recovery_timeout: Duration,

    /// Requests allowed through while half-open
    pub max_half_open_requests: u32,
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > limits::MAX_FAILURE_THRESHOLD {
            return Err(format!(
                "failure_threshold should not exceed {}",
                limits::MAX_FAILURE_THRESHOLD
            ));
        }

        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be greater than 0".to_string());
        }

        if self.max_half_open_requests == 0 {
            return Err("max_half_open_requests must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_millis(defaults::RECOVERY_TIMEOUT_MS),
            max_half_open_requests: defaults::MAX_HALF_OPEN_REQUESTS,
        }
    }
}
