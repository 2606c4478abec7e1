//! # Backpressure Gate
//!
//! Bounded, non-blocking admission control for a single destination. A slot
//! is taken at admission and returned when the task reaches its final
//! outcome, so `in_flight` counts queued plus executing work.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// What the router does with a task that arrives at a full destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the incoming task
    #[default]
    RejectNewest,
    /// Evict the oldest queued task from the lowest lane strictly below the
    /// incoming task's priority, rejecting the newcomer if there is none
    RejectOldestLowPriority,
}

#[derive(Debug)]
pub struct BackpressureGate {
    name: String,
    capacity: usize,
    in_flight: AtomicUsize,
    rejected: AtomicU64,
}

impl BackpressureGate {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            in_flight: AtomicUsize::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Take a slot if one is free. Never blocks.
    pub fn try_acquire(&self) -> bool {
        let acquired = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.capacity).then_some(current + 1)
            })
            .is_ok();

        if !acquired {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(
                destination = %self.name,
                capacity = self.capacity,
                "🚧 Backpressure gate full"
            );
        }
        acquired
    }

    /// Return a slot; the count never drops below zero
    pub fn release(&self) {
        let released = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });

        if released.is_err() {
            warn!(destination = %self.name, "Backpressure release without matching acquire");
        }
    }

    /// Count a rejection that did not go through `try_acquire`
    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_flight())
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Fraction of capacity in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.in_flight() as f64 / self.capacity as f64
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_until_full() {
        let gate = BackpressureGate::new("dest", 2);

        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert_eq!(gate.in_flight(), 2);
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.rejected_count(), 1);

        gate.release();
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_release_floors_at_zero() {
        let gate = BackpressureGate::new("dest", 1);
        gate.release();
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.try_acquire());
        assert_eq!(gate.utilization(), 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquires_never_exceed_capacity() {
        let gate = Arc::new(BackpressureGate::new("dest", 10));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.try_acquire() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 10);
        assert_eq!(gate.in_flight(), 10);
        assert_eq!(gate.rejected_count(), 90);
    }

    #[test]
    fn test_overflow_policy_serde_names() {
        let policy: OverflowPolicy = serde_json::from_str("\"reject_oldest_low_priority\"").unwrap();
        assert_eq!(policy, OverflowPolicy::RejectOldestLowPriority);
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::RejectNewest);
    }
}
