//! # Callosum Configuration System
//!
//! Typed configuration for the router, loaded from layered YAML files and
//! environment variables by [`ConfigManager`].
//!
//! ## Architecture
//!
//! - **Defaults First**: every field has a default, so an empty file is a valid file
//! - **Environment Awareness**: `callosum.{environment}.yaml` overrides the base file
//! - **Environment Variables**: `CALLOSUM__SECTION__KEY` overrides both files
//! - **Explicit Validation**: zero capacities and thresholds are rejected at load time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use callosum_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let threshold = manager.config().circuit_breaker.failure_threshold;
//! let ttl = manager.config().results.result_ttl();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, limits};
use crate::resilience::{CircuitBreakerConfig, OverflowPolicy};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring callosum.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CallosumConfig {
    /// Per-destination circuit breaker settings
    pub circuit_breaker: CircuitBreakerSettings,

    /// Per-destination admission control
    pub backpressure: BackpressureConfig,

    /// Dispatcher retry and concurrency settings
    pub dispatch: DispatchConfig,

    /// Result store polling and retention
    pub results: ResultsConfig,

    /// Router lifecycle settings
    pub router: RouterConfig,

    /// Event bus settings
    pub events: EventsConfig,
}

/// Circuit breaker configuration shared by every destination
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub max_half_open_requests: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::FAILURE_THRESHOLD,
            recovery_timeout_ms: defaults::RECOVERY_TIMEOUT_MS,
            max_half_open_requests: defaults::MAX_HALF_OPEN_REQUESTS,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    /// Convert to the runtime configuration consumed by a single breaker
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout(),
            max_half_open_requests: self.max_half_open_requests,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackpressureConfig {
    /// Maximum queued plus executing tasks per destination
    pub queue_capacity_per_destination: usize,
    /// What to do with a task that arrives at a full destination
    pub overflow_policy: OverflowPolicy,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            queue_capacity_per_destination: defaults::QUEUE_CAPACITY_PER_DESTINATION,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Re-invocations after the first attempt fails
    pub max_retries: u32,
    /// Base delay for linear retry backoff
    pub retry_backoff_ms: u64,
    /// Consumer invocations allowed to run at once for one destination
    pub max_concurrent_dispatches: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            max_concurrent_dispatches: defaults::MAX_CONCURRENT_DISPATCHES,
        }
    }
}

impl DispatchConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Delay before re-invocation number `attempt` (1-based)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_backoff().saturating_mul(attempt.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResultsConfig {
    /// Unclaimed results older than this are reaped
    pub result_ttl_ms: u64,
    /// How often the reaper sweeps the store
    pub reaper_interval_ms: u64,
    pub poll_initial_ms: u64,
    pub poll_multiplier: f64,
    pub poll_max_ms: u64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            result_ttl_ms: defaults::RESULT_TTL_MS,
            reaper_interval_ms: defaults::REAPER_INTERVAL_MS,
            poll_initial_ms: defaults::POLL_INITIAL_MS,
            poll_multiplier: defaults::POLL_MULTIPLIER,
            poll_max_ms: defaults::POLL_MAX_MS,
        }
    }
}

impl ResultsConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_millis(self.result_ttl_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Budget for bringing up the transport before falling back to direct mode
    pub router_startup_timeout_ms: u64,
    /// Default budget for draining dispatchers on shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            router_startup_timeout_ms: defaults::ROUTER_STARTUP_TIMEOUT_MS,
            shutdown_timeout_ms: defaults::SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl RouterConfig {
    pub fn router_startup_timeout(&self) -> Duration {
        Duration::from_millis(self.router_startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Bounded queue per subscriber; a full queue drops events for that subscriber
    pub subscriber_queue_capacity: usize,
    pub history_capacity: usize,
    pub history_window_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: defaults::SUBSCRIBER_QUEUE_CAPACITY,
            history_capacity: defaults::HISTORY_CAPACITY,
            history_window_ms: defaults::HISTORY_WINDOW_MS,
        }
    }
}

impl EventsConfig {
    pub fn history_window(&self) -> Duration {
        Duration::from_millis(self.history_window_ms)
    }
}

impl CallosumConfig {
    /// Validate configuration values, returning the first violation found
    pub fn validate(&self) -> ConfigResult<()> {
        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 || cb.failure_threshold > limits::MAX_FAILURE_THRESHOLD {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.failure_threshold",
                cb.failure_threshold,
                format!("must be between 1 and {}", limits::MAX_FAILURE_THRESHOLD),
            ));
        }

        if cb.recovery_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.recovery_timeout_ms",
                "0",
                "recovery timeout must be greater than 0",
            ));
        }

        if cb.max_half_open_requests == 0
            || cb.max_half_open_requests > limits::MAX_HALF_OPEN_REQUESTS
        {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.max_half_open_requests",
                cb.max_half_open_requests,
                format!("must be between 1 and {}", limits::MAX_HALF_OPEN_REQUESTS),
            ));
        }

        let capacity = self.backpressure.queue_capacity_per_destination;
        if capacity == 0 || capacity > limits::MAX_QUEUE_CAPACITY {
            return Err(ConfigurationError::invalid_value(
                "backpressure.queue_capacity_per_destination",
                capacity,
                format!("must be between 1 and {}", limits::MAX_QUEUE_CAPACITY),
            ));
        }

        if self.dispatch.max_retries > limits::MAX_RETRIES {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_retries",
                self.dispatch.max_retries,
                format!("should not exceed {}", limits::MAX_RETRIES),
            ));
        }

        if self.dispatch.max_concurrent_dispatches == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_concurrent_dispatches",
                "0",
                "at least one dispatch slot is required",
            ));
        }

        let results = &self.results;
        if results.poll_initial_ms == 0 || results.poll_max_ms < results.poll_initial_ms {
            return Err(ConfigurationError::validation_error(format!(
                "results poll window invalid: initial={}ms max={}ms",
                results.poll_initial_ms, results.poll_max_ms
            )));
        }

        if !(results.poll_multiplier >= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "results.poll_multiplier",
                results.poll_multiplier,
                "multiplier must be at least 1.0",
            ));
        }

        if results.result_ttl_ms == 0 || results.reaper_interval_ms == 0 {
            return Err(ConfigurationError::validation_error(
                "results.result_ttl_ms and results.reaper_interval_ms must be greater than 0",
            ));
        }

        if self.router.router_startup_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "router.router_startup_timeout_ms",
                "0",
                "startup timeout must be greater than 0",
            ));
        }

        if self.events.subscriber_queue_capacity == 0 || self.events.history_capacity == 0 {
            return Err(ConfigurationError::validation_error(
                "events.subscriber_queue_capacity and events.history_capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = CallosumConfig::default();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout(), Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.max_half_open_requests, 3);
        assert_eq!(config.backpressure.queue_capacity_per_destination, 1000);
        assert_eq!(config.backpressure.overflow_policy, OverflowPolicy::RejectNewest);
        assert_eq!(config.dispatch.max_retries, 3);
        assert_eq!(config.dispatch.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.results.result_ttl(), Duration::from_secs(300));
        assert_eq!(config.router.router_startup_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_linear_backoff() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(dispatch.backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(dispatch.backoff_for_attempt(3), Duration::from_secs(3));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = CallosumConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = CallosumConfig::default();
        config.backpressure.queue_capacity_per_destination = 0;
        assert!(config.validate().is_err());

        let mut config = CallosumConfig::default();
        config.dispatch.max_concurrent_dispatches = 0;
        assert!(config.validate().is_err());

        let mut config = CallosumConfig::default();
        config.results.poll_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_resilience_config() {
        let settings = CircuitBreakerSettings {
            failure_threshold: 2,
            recovery_timeout_ms: 250,
            max_half_open_requests: 1,
        };
        let runtime = settings.to_resilience_config();
        assert_eq!(runtime.failure_threshold, 2);
        assert_eq!(runtime.recovery_timeout, Duration::from_millis(250));
        assert_eq!(runtime.max_half_open_requests, 1);
    }
}
