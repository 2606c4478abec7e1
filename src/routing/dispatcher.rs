//! Per-destination dispatcher.
//!
//! Each destination gets one dispatcher loop. It takes a concurrency permit
//! before dequeuing, so with one permit tasks run in strict priority order.
//! Retries happen inside the dispatcher; the breaker sees one outcome per task.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::DispatchConfig;
use crate::events::{EventBus, EventType};
use crate::results::ResultStore;
use crate::routing::consumer::invoke_with_deadline;
use crate::routing::registry::{Destination, DestinationCounters};
use crate::routing::route::QueuedTask;
use crate::routing::task::{Task, TaskError, TaskResult};

/// Shared collaborators needed to execute and settle a task
#[derive(Debug, Clone)]
pub(crate) struct DispatchContext {
    pub results: Arc<ResultStore>,
    pub events: Arc<EventBus>,
    /// Task id to destination name for every admitted, unsettled task
    pub in_flight: Arc<DashMap<String, String>>,
    pub dispatch: DispatchConfig,
}

impl DispatchContext {
    /// Invoke the consumer with retries and report one outcome to the breaker
    pub async fn execute(&self, destination: &Destination, task: &Task) -> TaskResult {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.events.emit(
                EventType::TaskStarted,
                json!({
                    "task_id": task.id,
                    "destination": destination.name,
                    "attempt": attempt,
                }),
            );

            let deadline = Instant::now() + task.timeout;
            match invoke_with_deadline(destination.consumer.as_ref(), &task.payload, deadline).await
            {
                Ok(output) => {
                    destination.breaker.record_success();
                    return TaskResult::completed(&task.id, output, started.elapsed(), attempt);
                }
                Err(err) => {
                    let error = err.into_task_error(task.timeout);

                    if attempt > self.dispatch.max_retries {
                        destination.breaker.record_failure();
                        return TaskResult::failed(&task.id, error, started.elapsed(), attempt);
                    }

                    let delay = self.dispatch.backoff_for_attempt(attempt);
                    DestinationCounters::incr(&destination.counters.retries);
                    warn!(
                        task_id = %task.id,
                        destination = %destination.name,
                        attempt = attempt,
                        max_retries = self.dispatch.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔄 Consumer attempt failed, retrying"
                    );
                    self.events.emit(
                        EventType::TaskRetrying,
                        json!({
                            "task_id": task.id,
                            "destination": destination.name,
                            "attempt": attempt,
                            "delay_ms": delay.as_millis() as u64,
                            "error": error.to_string(),
                        }),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Release admission resources and publish the final outcome.
    ///
    /// With `store` the result goes to the result store before the task id
    /// leaves the in-flight set, so a waiter never sees neither.
    pub fn settle(&self, destination: &Destination, task_id: &str, result: TaskResult, store: bool) {
        destination.gate.release();

        let execution_time_ms = result.execution_time.as_millis() as u64;
        if result.is_success() {
            DestinationCounters::incr(&destination.counters.completed);
            self.events.emit(
                EventType::TaskCompleted,
                json!({
                    "task_id": task_id,
                    "destination": destination.name,
                    "attempts": result.attempts,
                    "execution_time_ms": execution_time_ms,
                }),
            );
        } else {
            DestinationCounters::incr(&destination.counters.failed);
            self.events.emit(
                EventType::TaskFailed,
                json!({
                    "task_id": task_id,
                    "destination": destination.name,
                    "attempts": result.attempts,
                    "execution_time_ms": execution_time_ms,
                    "error": result.error.as_ref().map(|e| e.to_string()),
                }),
            );
        }

        // Shutdown may already have settled an interrupted task
        if store {
            self.store_once(task_id, result);
        }
        self.in_flight.remove(task_id);
    }

    /// Give a task that never reached the consumer a terminal result.
    ///
    /// The gate slot is left to the caller, which either releases it or
    /// hands it to another task.
    pub fn abandon(&self, destination: &Destination, task_id: &str, error: TaskError) {
        DestinationCounters::incr(&destination.counters.rejected);
        self.events.emit(
            EventType::TaskRejected,
            json!({
                "task_id": task_id,
                "destination": destination.name,
                "reason": error.kind(),
            }),
        );
        self.store_once(task_id, TaskResult::rejected(task_id, error));
        self.in_flight.remove(task_id);
    }

    /// Give up a reservation for a task that never reached a route.
    ///
    /// The entry lock is held while `result` is stored, so exactly one of
    /// the rejecting caller and the shutdown sweep settles the id. Returns
    /// `false` when the reservation was already settled elsewhere.
    pub fn release_reservation(&self, task_id: &str, result: Option<TaskResult>) -> bool {
        match self.in_flight.entry(task_id.to_string()) {
            Entry::Occupied(entry) => {
                if let Some(result) = result {
                    self.store_once(task_id, result);
                }
                entry.remove();
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    fn store_once(&self, task_id: &str, result: TaskResult) {
        if let Err(error) = self.results.try_put(task_id, result) {
            warn!(task_id = %task_id, error = %error, "Result already stored; dropping late outcome");
        }
    }
}

pub(crate) struct Dispatcher {
    destination: Arc<Destination>,
    context: DispatchContext,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(destination: Arc<Destination>, context: DispatchContext) -> Self {
        let permits = Arc::new(Semaphore::new(context.dispatch.max_concurrent_dispatches.max(1)));
        Self {
            destination,
            context,
            permits,
        }
    }

    /// Drain the route until it is closed and empty, then wait for running tasks
    #[instrument(skip(self), fields(destination = %self.destination.name))]
    pub async fn run(self) {
        let mut running = JoinSet::new();
        info!(
            max_concurrent = self.context.dispatch.max_concurrent_dispatches,
            "🚀 DISPATCHER: Started"
        );

        loop {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            // Reap finished executions so the set stays small
            while running.try_join_next().is_some() {}

            let Some(queued) = self.destination.route.pop().await else {
                break;
            };

            let destination = self.destination.clone();
            let context = self.context.clone();
            running.spawn(async move {
                dispatch_one(&context, &destination, queued).await;
                drop(permit);
            });
        }

        while running.join_next().await.is_some() {}
        debug!("🛑 DISPATCHER: Route closed and drained");
    }
}

async fn dispatch_one(context: &DispatchContext, destination: &Destination, queued: QueuedTask) {
    let QueuedTask {
        task, enqueued_at, ..
    } = queued;

    DestinationCounters::incr(&destination.counters.dispatched);
    debug!(
        task_id = %task.id,
        destination = %destination.name,
        priority = %task.message_priority(),
        queued_ms = enqueued_at.elapsed().as_millis() as u64,
        "📤 Dispatching task"
    );

    let result = context.execute(destination, &task).await;
    context.settle(destination, &task.id, result, true);
}
