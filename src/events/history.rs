//! Bounded in-memory event history.
//!
//! Keeps at most `capacity` events and nothing older than `window`,
//! whichever binds first.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::events::types::{Event, EventType};

#[derive(Debug)]
pub struct EventHistory {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    window: chrono::Duration,
}

impl EventHistory {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            window: chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(3650)),
        }
    }

    pub fn record(&self, event: Event) {
        let mut events = self.events.lock();
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
        Self::prune(&mut events, self.cutoff());
    }

    fn cutoff(&self) -> Option<DateTime<Utc>> {
        Utc::now().checked_sub_signed(self.window)
    }

    fn prune(events: &mut VecDeque<Event>, cutoff: Option<DateTime<Utc>>) {
        if let Some(cutoff) = cutoff {
            while events.front().is_some_and(|e| e.timestamp < cutoff) {
                events.pop_front();
            }
        }
    }

    /// The newest `limit` events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let mut events = self.events.lock();
        Self::prune(&mut events, self.cutoff());
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    /// The newest `limit` events of one type, oldest first
    pub fn by_type(&self, event_type: EventType, limit: usize) -> Vec<Event> {
        let mut events = self.events.lock();
        Self::prune(&mut events, self.cutoff());
        let mut matching: Vec<Event> = events
            .iter()
            .rev()
            .filter(|e| e.event_type == event_type)
            .take(limit)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }

    /// Every retained event at or after `timestamp`
    pub fn since(&self, timestamp: DateTime<Utc>) -> Vec<Event> {
        let mut events = self.events.lock();
        Self::prune(&mut events, self.cutoff());
        events
            .iter()
            .filter(|e| e.timestamp >= timestamp)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
