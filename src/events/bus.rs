//! Event bus with per-subscriber bounded queues.
//!
//! `publish` never blocks and never fails. Each subscriber owns a bounded
//! queue; when it is full the event is dropped for that subscriber only and
//! counted. A subscriber that never drains cannot slow the router down.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EventsConfig;
use crate::events::history::EventHistory;
use crate::events::types::{Event, EventFilter, EventType};

/// Receives events on a dedicated drain task
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);
}

#[derive(Debug)]
struct SubscriberSlot {
    id: u64,
    filter: EventFilter,
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

/// Handle to one subscription
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    dropped: Arc<AtomicU64>,
    drain: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Events discarded because this subscriber's queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the observer drain task is still running
    pub fn is_active(&self) -> bool {
        self.drain.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

/// Snapshot of bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub subscribers: usize,
    pub history_len: usize,
}

#[derive(Debug)]
pub struct EventBus {
    subscribers: RwLock<Vec<SubscriberSlot>>,
    history: EventHistory,
    queue_capacity: usize,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new(config: &EventsConfig) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: EventHistory::new(config.history_capacity, config.history_window()),
            queue_capacity: config.subscriber_queue_capacity.max(1),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish an event to history and every matching subscriber
    pub fn publish(&self, event: Event) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for slot in subscribers.iter() {
                if !slot.filter.matches(event.event_type) {
                    continue;
                }
                match slot.sender.try_send(event.clone()) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        slot.dropped.fetch_add(1, Ordering::Relaxed);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(slot.id),
                }
            }
        }

        if !closed.is_empty() {
            self.subscribers
                .write()
                .retain(|slot| !closed.contains(&slot.id));
            debug!(count = closed.len(), "📡 Removed closed event subscribers");
        }

        self.history.record(event);
    }

    /// Build and publish an event in one call
    pub fn emit(&self, event_type: EventType, payload: Value) {
        self.publish(Event::new(event_type, payload));
    }

    /// Register an observer, drained on its own tokio task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, observer: Arc<dyn Observer>, filter: EventFilter) -> Subscription {
        let (id, dropped, mut receiver) = self.register(filter);

        let drain = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                observer.on_event(&event);
            }
        });

        Subscription {
            id,
            dropped,
            drain: Some(drain),
        }
    }

    /// Register a raw channel subscriber; the caller drains the receiver
    pub fn subscribe_channel(&self, filter: EventFilter) -> (Subscription, mpsc::Receiver<Event>) {
        let (id, dropped, receiver) = self.register(filter);
        (
            Subscription {
                id,
                dropped,
                drain: None,
            },
            receiver,
        )
    }

    fn register(&self, filter: EventFilter) -> (u64, Arc<AtomicU64>, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(AtomicU64::new(0));

        self.subscribers.write().push(SubscriberSlot {
            id,
            filter,
            sender,
            dropped: dropped.clone(),
        });

        debug!(subscriber_id = id, "📡 Event subscriber registered");
        (id, dropped, receiver)
    }

    /// Remove a subscription; its drain task finishes once the queue empties
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|slot| slot.id != subscription.id);
        let removed = subscribers.len() != before;
        if !removed {
            warn!(subscriber_id = subscription.id, "Unsubscribe for unknown subscriber");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.history.recent(limit)
    }

    pub fn by_type(&self, event_type: EventType, limit: usize) -> Vec<Event> {
        self.history.by_type(event_type, limit)
    }

    pub fn since(&self, timestamp: chrono::DateTime<chrono::Utc>) -> Vec<Event> {
        self.history.since(timestamp)
    }

    /// Total events dropped across all subscribers
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped_total(),
            subscribers: self.subscriber_count(),
            history_len: self.history.len(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(&EventsConfig::default())
    }
}
