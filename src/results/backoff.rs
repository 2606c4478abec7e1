//! Poll interval schedule used while waiting for a result.

use std::time::Duration;

use crate::config::ResultsConfig;

/// Exponential poll schedule: `initial`, then `× multiplier`, capped at `max`
#[derive(Debug, Clone)]
pub struct PollBackoff {
    next: Duration,
    multiplier: f64,
    max: Duration,
}

impl PollBackoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            multiplier: multiplier.max(1.0),
            max,
        }
    }

    pub fn from_config(config: &ResultsConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_initial_ms),
            config.poll_multiplier,
            Duration::from_millis(config.poll_max_ms),
        )
    }

    /// Next sleep, truncated so it never runs past `remaining`
    pub fn next_delay(&mut self, remaining: Duration) -> Duration {
        let delay = self.next.min(remaining);
        self.next = self.next.mul_f64(self.multiplier).min(self.max);
        delay
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::from_config(&ResultsConfig::default())
    }
}
