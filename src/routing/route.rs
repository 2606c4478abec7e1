//! Strict-priority route into one destination.
//!
//! Five FIFO lanes; the highest non-empty lane is always drained first.
//! Low-priority work can starve under sustained high-priority load.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::constants::PRIORITY_LANES;
use crate::routing::priority::MessagePriority;
use crate::routing::task::Task;

/// A task waiting in a route lane
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task: Task,
    pub priority: MessagePriority,
    pub enqueued_at: Instant,
}

impl QueuedTask {
    pub fn new(task: Task) -> Self {
        let priority = task.message_priority();
        Self {
            task,
            priority,
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Lanes {
    lanes: [VecDeque<QueuedTask>; PRIORITY_LANES],
    closed: bool,
}

impl Lanes {
    fn pop_highest(&mut self) -> Option<QueuedTask> {
        self.lanes.iter_mut().rev().find_map(VecDeque::pop_front)
    }
}

#[derive(Debug)]
pub struct Route {
    destination: String,
    lanes: Mutex<Lanes>,
    ready: Notify,
}

impl Route {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            lanes: Mutex::new(Lanes::default()),
            ready: Notify::new(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Append to the task's lane; hands the task back if the route is closed
    pub fn push(&self, queued: QueuedTask) -> Result<(), QueuedTask> {
        {
            let mut lanes = self.lanes.lock();
            if lanes.closed {
                return Err(queued);
            }
            lanes.lanes[queued.priority.lane()].push_back(queued);
        }
        self.ready.notify_one();
        Ok(())
    }

    pub fn try_pop(&self) -> Option<QueuedTask> {
        self.lanes.lock().pop_highest()
    }

    /// Wait for the next task. Returns `None` once closed and empty.
    pub async fn pop(&self) -> Option<QueuedTask> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut lanes = self.lanes.lock();
                if let Some(queued) = lanes.pop_highest() {
                    return Some(queued);
                }
                if lanes.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Remove the oldest task from the lowest lane strictly below `priority`
    pub fn evict_lowest_below(&self, priority: MessagePriority) -> Option<QueuedTask> {
        let mut lanes = self.lanes.lock();
        lanes.lanes[..priority.lane()]
            .iter_mut()
            .find_map(VecDeque::pop_front)
    }

    /// Stop accepting tasks; queued tasks remain poppable
    pub fn close(&self) {
        self.lanes.lock().closed = true;
        self.ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lanes.lock().closed
    }

    /// Remove every queued task, highest priority first
    pub fn drain(&self) -> Vec<QueuedTask> {
        let mut lanes = self.lanes.lock();
        std::iter::from_fn(|| lanes.pop_highest()).collect()
    }

    pub fn depth(&self) -> usize {
        self.lanes.lock().lanes.iter().map(VecDeque::len).sum()
    }

    /// Queue depth per lane, indexed by [`MessagePriority::lane`]
    pub fn lane_depths(&self) -> [usize; PRIORITY_LANES] {
        let lanes = self.lanes.lock();
        std::array::from_fn(|lane| lanes.lanes[lane].len())
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}
