//! # Router
//!
//! Admission, enqueueing and result delivery for every registered
//! destination. Admission runs in a fixed order: id reservation, destination
//! lookup, circuit breaker, backpressure gate. A rejected task is never
//! enqueued and its caller gets a `Failed` result immediately.
//!
//! In [`RouterMode::Direct`] there are no dispatchers: consumers run inline on
//! the caller's task under the same retry policy.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::CallosumConfig;
use crate::error::{CallosumError, Result};
use crate::events::{EventBus, EventType};
use crate::logging::{log_routing_decision, log_task_operation};
use crate::resilience::{OverflowPolicy, SystemCircuitBreakerMetrics};
use crate::results::{ResultReaper, ResultStore};
use crate::routing::dispatcher::{DispatchContext, Dispatcher};
use crate::routing::priority::MessagePriority;
use crate::routing::registry::{Destination, DestinationCounters, DestinationRegistry};
use crate::routing::route::QueuedTask;
use crate::routing::stats::{DestinationStats, RouterStats};
use crate::routing::task::{Task, TaskError, TaskResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    /// Tasks are queued per destination and executed by dispatchers
    Routed,
    /// Transport unavailable; consumers run inline on the caller's task
    Direct,
}

impl fmt::Display for RouterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterMode::Routed => write!(f, "routed"),
            RouterMode::Direct => write!(f, "direct"),
        }
    }
}

pub struct Router {
    config: CallosumConfig,
    mode: RouterMode,
    degraded_reason: Option<String>,
    transport: String,
    registry: Arc<DestinationRegistry>,
    context: DispatchContext,
    accepting: AtomicBool,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    reaper: Mutex<Option<ResultReaper>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("mode", &self.mode)
            .field("transport", &self.transport)
            .field("destinations", &self.registry.names())
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish()
    }
}

impl Router {
    /// Wire up a router and start its background tasks
    pub(crate) fn launch(
        config: CallosumConfig,
        mode: RouterMode,
        degraded_reason: Option<String>,
        transport: String,
        registry: DestinationRegistry,
        events: Arc<EventBus>,
    ) -> Self {
        let results = Arc::new(ResultStore::new(config.results.clone()));
        let context = DispatchContext {
            results: results.clone(),
            events: events.clone(),
            in_flight: Arc::new(DashMap::new()),
            dispatch: config.dispatch.clone(),
        };
        let registry = Arc::new(registry);

        let dispatchers = match mode {
            RouterMode::Routed => registry
                .iter()
                .map(|destination| {
                    tokio::spawn(Dispatcher::new(destination.clone(), context.clone()).run())
                })
                .collect(),
            RouterMode::Direct => Vec::new(),
        };

        let reaper = ResultReaper::start(
            results,
            events.clone(),
            config.results.result_ttl(),
            config.results.reaper_interval(),
        );

        let router = Self {
            config,
            mode,
            degraded_reason,
            transport,
            registry,
            context,
            accepting: AtomicBool::new(true),
            dispatchers: Mutex::new(dispatchers),
            reaper: Mutex::new(Some(reaper)),
        };

        if let Some(reason) = &router.degraded_reason {
            warn!(
                transport = %router.transport,
                reason = %reason,
                "⚠️ ROUTER: Running in direct mode"
            );
            events.emit(
                EventType::RouterDegraded,
                json!({ "transport": router.transport, "reason": reason }),
            );
        }

        info!(
            mode = %router.mode,
            transport = %router.transport,
            destinations = router.registry.len(),
            "✅ ROUTER: Started"
        );
        events.emit(
            EventType::RouterStarted,
            json!({
                "mode": router.mode.to_string(),
                "transport": router.transport,
                "destinations": router.registry.names(),
            }),
        );

        router
    }

    /// Route a task and wait up to `task.timeout` for its result.
    ///
    /// Never fails: rejections come back as `Failed` results and an expired
    /// wait as `TimedOut`, while the task may still finish in the background.
    #[instrument(skip(self, task), fields(task_id = %task.id, destination = %task.destination))]
    pub async fn route_and_wait(&self, mut task: Task) -> TaskResult {
        let destination = match self.admit(&mut task, false) {
            Ok(destination) => destination,
            Err(error) => return TaskResult::rejected(&task.id, error),
        };

        match self.mode {
            RouterMode::Routed => {
                let task_id = task.id.clone();
                let timeout = task.timeout;
                if let Err(error) = self.enqueue(&destination, task, false) {
                    return TaskResult::rejected(&task_id, error);
                }

                match self.context.results.wait_for(&task_id, timeout).await {
                    Some(result) => result,
                    None => {
                        info!(
                            task_id = %task_id,
                            timeout_ms = timeout.as_millis() as u64,
                            "⏳ Caller wait expired; task continues in the background"
                        );
                        TaskResult::timed_out(&task_id, timeout)
                    }
                }
            }
            RouterMode::Direct => run_direct(&self.context, &destination, task, false).await,
        }
    }

    /// Route a task without waiting; returns its id once admitted.
    ///
    /// The result, including an admission rejection, can be collected with
    /// [`Router::claim_result`] until it is reaped.
    #[instrument(skip(self, task), fields(task_id = %task.id, destination = %task.destination))]
    pub fn route_fire_and_forget(&self, mut task: Task) -> std::result::Result<String, TaskError> {
        let destination = self.admit(&mut task, true)?;

        let task_id = task.id.clone();
        match self.mode {
            RouterMode::Routed => self.enqueue(&destination, task, true)?,
            RouterMode::Direct => {
                let context = self.context.clone();
                tokio::spawn(async move {
                    run_direct(&context, &destination, task, true).await;
                });
            }
        }

        Ok(task_id)
    }

    /// Wait up to `timeout` for the result of a fire-and-forget task
    pub async fn claim_result(&self, task_id: &str, timeout: Duration) -> Option<TaskResult> {
        self.context.results.wait_for(task_id, timeout).await
    }

    /// Reserve the task id, then run the breaker and gate checks.
    ///
    /// Every rejection after the reservation settles that reservation, storing
    /// the rejection when `store_rejection` is set. A duplicate id is never
    /// stored because its result slot belongs to the other task.
    fn admit(
        &self,
        task: &mut Task,
        store_rejection: bool,
    ) -> std::result::Result<Arc<Destination>, TaskError> {
        task.ensure_id();
        let priority = task.message_priority();
        let known = self.registry.get(&task.destination).cloned();

        let reserved = !self.context.results.contains(&task.id)
            && match self.context.in_flight.entry(task.id.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(task.destination.clone());
                    true
                }
            };
        if !reserved {
            let error = TaskError::DuplicateTask {
                task_id: task.id.clone(),
            };
            return Err(self.reject(task, known.as_deref(), error));
        }

        if !self.accepting.load(Ordering::Acquire) {
            return Err(self.refuse(task, known.as_deref(), TaskError::Shutdown, store_rejection));
        }

        let Some(destination) = known else {
            let error = match self.mode {
                RouterMode::Routed => TaskError::UnknownDestination {
                    destination: task.destination.clone(),
                },
                RouterMode::Direct => TaskError::RouterUnavailable {
                    reason: format!(
                        "router is in direct mode and no consumer is registered for '{}'",
                        task.destination
                    ),
                },
            };
            return Err(self.refuse(task, None, error, store_rejection));
        };

        if !destination.breaker.allow_request() {
            let error = TaskError::CircuitOpen {
                destination: destination.name.clone(),
            };
            return Err(self.refuse(task, Some(&destination), error, store_rejection));
        }

        if !destination.gate.try_acquire() && !self.make_room(&destination, priority) {
            self.context.events.emit(
                EventType::BackpressureTriggered,
                json!({
                    "destination": destination.name,
                    "task_id": task.id,
                    "capacity": destination.gate.capacity(),
                    "action": "rejected",
                }),
            );
            let error = TaskError::Backpressure {
                destination: destination.name.clone(),
                capacity: destination.gate.capacity(),
            };
            return Err(self.refuse(task, Some(&destination), error, store_rejection));
        }

        Ok(destination)
    }

    /// Reject a task whose id this call reserved and give the reservation up
    fn refuse(
        &self,
        task: &Task,
        destination: Option<&Destination>,
        error: TaskError,
        store_rejection: bool,
    ) -> TaskError {
        let error = self.reject(task, destination, error);
        let rejected = store_rejection.then(|| TaskResult::rejected(&task.id, error.clone()));
        self.context.release_reservation(&task.id, rejected);
        error
    }

    /// Under `RejectOldestLowPriority`, evict a queued task of lower priority
    /// and hand its gate slot to the newcomer
    fn make_room(&self, destination: &Destination, priority: MessagePriority) -> bool {
        if self.mode != RouterMode::Routed
            || self.config.backpressure.overflow_policy != OverflowPolicy::RejectOldestLowPriority
        {
            return false;
        }

        let Some(victim) = destination.route.evict_lowest_below(priority) else {
            return false;
        };

        warn!(
            destination = %destination.name,
            evicted_task_id = %victim.task.id,
            evicted_priority = %victim.priority,
            incoming_priority = %priority,
            "🚧 Backpressure evicted a lower-priority task"
        );
        self.context.events.emit(
            EventType::BackpressureTriggered,
            json!({
                "destination": destination.name,
                "task_id": victim.task.id,
                "capacity": destination.gate.capacity(),
                "action": "evicted",
            }),
        );
        log_task_operation(
            "evict",
            &victim.task.id,
            Some(&destination.name),
            "failed",
            Some("evicted by a higher-priority task under backpressure"),
        );
        self.context.abandon(
            destination,
            &victim.task.id,
            TaskError::Backpressure {
                destination: destination.name.clone(),
                capacity: destination.gate.capacity(),
            },
        );
        true
    }

    fn enqueue(
        &self,
        destination: &Destination,
        task: Task,
        store_rejection: bool,
    ) -> std::result::Result<(), TaskError> {
        let queued = QueuedTask::new(task);
        let task_id = queued.task.id.clone();
        let priority = queued.priority;

        if let Err(queued) = destination.route.push(queued) {
            let error = if self.accepting.load(Ordering::Acquire) {
                TaskError::RouterUnavailable {
                    reason: format!("dispatcher for '{}' has stopped", destination.name),
                }
            } else {
                TaskError::Shutdown
            };
            let error = self.reject(&queued.task, Some(destination), error);
            let rejected = store_rejection.then(|| TaskResult::rejected(&task_id, error.clone()));
            if self.context.release_reservation(&task_id, rejected) {
                destination.gate.release();
            } else if !store_rejection {
                // The shutdown sweep settled this id and nobody else will claim it
                let _ = self.context.results.take(&task_id);
            }
            return Err(error);
        }

        log_routing_decision(&task_id, &destination.name, priority.as_str(), "enqueued");
        self.context.events.emit(
            EventType::TaskQueued,
            json!({
                "task_id": task_id,
                "destination": destination.name,
                "priority": priority.as_str(),
            }),
        );
        Ok(())
    }

    fn reject(&self, task: &Task, destination: Option<&Destination>, error: TaskError) -> TaskError {
        if let Some(destination) = destination {
            DestinationCounters::incr(&destination.counters.rejected);
        }
        debug!(
            task_id = %task.id,
            destination = %task.destination,
            reason = error.kind(),
            "🚫 Task rejected at admission"
        );
        self.context.events.emit(
            EventType::TaskRejected,
            json!({
                "task_id": task.id,
                "destination": task.destination,
                "reason": error.kind(),
            }),
        );
        error
    }

    pub fn mode(&self) -> RouterMode {
        self.mode
    }

    /// Why the router fell back to direct mode, if it did
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &CallosumConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.context.events
    }

    pub fn results(&self) -> &Arc<ResultStore> {
        &self.context.results
    }

    pub fn destinations(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn stats(&self) -> RouterStats {
        let mut circuit_breakers = SystemCircuitBreakerMetrics::new();
        let mut destinations = Vec::with_capacity(self.registry.len());

        for destination in self.registry.iter() {
            circuit_breakers.add_circuit_breaker(
                destination.name.clone(),
                destination.breaker.metrics(),
            );
            destinations.push(DestinationStats::collect(destination));
        }
        destinations.sort_by(|a, b| a.name.cmp(&b.name));

        RouterStats {
            mode: self.mode,
            transport: self.transport.clone(),
            accepting: self.is_accepting(),
            destinations,
            in_flight_tasks: self.context.in_flight.len(),
            pending_results: self.context.results.len(),
            events: self.context.events.stats(),
            circuit_breakers,
        }
    }

    /// Trip a destination's breaker manually
    pub fn force_open(&self, destination: &str) -> Result<()> {
        self.destination(destination)?.breaker.force_open();
        Ok(())
    }

    /// Reset a destination's breaker manually
    pub fn force_closed(&self, destination: &str) -> Result<()> {
        self.destination(destination)?.breaker.force_closed();
        Ok(())
    }

    fn destination(&self, name: &str) -> Result<&Arc<Destination>> {
        self.registry
            .get(name)
            .ok_or_else(|| CallosumError::RoutingError(format!("unknown destination '{name}'")))
    }

    /// Stop admission and let dispatchers finish queued work within `timeout`.
    ///
    /// Work still queued or running when the timeout expires is settled as
    /// `Failed/Shutdown`.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            warn!("Router already shut down");
            return Ok(());
        }
        info!(timeout_ms = timeout.as_millis() as u64, "🛑 ROUTER: Shutdown requested");

        for destination in self.registry.iter() {
            destination.route.close();
        }

        let handles = std::mem::take(&mut *self.dispatchers.lock());
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drained = tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok();

        let mut abandoned = 0usize;
        if !drained {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "⚠️ ROUTER: Dispatchers did not drain in time; aborting"
            );
            for abort in aborts {
                abort.abort();
            }

            for destination in self.registry.iter() {
                for queued in destination.route.drain() {
                    destination.gate.release();
                    self.context
                        .abandon(destination, &queued.task.id, TaskError::Shutdown);
                    abandoned += 1;
                }
            }

            // Executions cut short by the abort still owe their callers a result
            let interrupted: Vec<(String, String)> = self
                .context
                .in_flight
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect();
            for (task_id, destination) in interrupted {
                let result = TaskResult::rejected(&task_id, TaskError::Shutdown);
                if !self.context.release_reservation(&task_id, Some(result)) {
                    continue;
                }
                if let Some(destination) = self.registry.get(&destination) {
                    destination.gate.release();
                }
                abandoned += 1;
            }
        }

        let reaper = self.reaper.lock().take();
        if let Some(reaper) = reaper {
            reaper.stop().await;
        }

        info!(drained = drained, abandoned = abandoned, "🛑 ROUTER: Shutdown complete");
        self.context.events.emit(
            EventType::RouterShutdown,
            json!({
                "mode": self.mode.to_string(),
                "drained": drained,
                "abandoned": abandoned,
            }),
        );
        Ok(())
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        // Closed routes let dispatcher loops exit once drained
        for destination in self.registry.iter() {
            destination.route.close();
        }
    }
}

/// Execute inline under the caller's budget, as direct mode does
async fn run_direct(
    context: &DispatchContext,
    destination: &Destination,
    task: Task,
    store: bool,
) -> TaskResult {
    DestinationCounters::incr(&destination.counters.dispatched);

    let result = match tokio::time::timeout(task.timeout, context.execute(destination, &task)).await
    {
        Ok(result) => result,
        Err(_) => {
            // The breaker still learns that the destination missed the budget
            destination.breaker.record_failure();
            TaskResult::timed_out(&task.id, task.timeout)
        }
    };

    context.settle(destination, &task.id, result.clone(), store);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::bootstrap::RouterBuilder;
    use crate::routing::consumer::consumer_fn;
    use crate::routing::task::TaskStatus;
    use serde_json::Value;

    async fn echo_router(config: CallosumConfig) -> Router {
        RouterBuilder::new(config)
            .register(
                "echo",
                consumer_fn(|payload: Value| async move { Ok(payload) }),
            )
            .start()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_route_and_wait_round_trip() {
        let router = echo_router(CallosumConfig::default()).await;

        let result = router
            .route_and_wait(Task::new("echo", json!({"hello": "world"})))
            .await;

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.output, json!({"hello": "world"}));
        assert_eq!(result.attempts, 1);
        assert!(router.results().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_destination_is_rejected() {
        let router = echo_router(CallosumConfig::default()).await;

        let result = router.route_and_wait(Task::new("nowhere", Value::Null)).await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(matches!(
            result.error,
            Some(TaskError::UnknownDestination { .. })
        ));
    }

    #[tokio::test]
    async fn test_forced_open_breaker_rejects_without_enqueue() {
        let router = echo_router(CallosumConfig::default()).await;
        router.force_open("echo").unwrap();

        let result = router.route_and_wait(Task::new("echo", Value::Null)).await;

        assert!(matches!(result.error, Some(TaskError::CircuitOpen { .. })));
        let stats = router.stats();
        let echo = stats.destination("echo").unwrap();
        assert_eq!(echo.dispatched, 0);
        assert_eq!(echo.rejected, 1);
        assert!(router.force_open("missing").is_err());
    }

    #[tokio::test]
    async fn test_fire_and_forget_then_claim() {
        let router = echo_router(CallosumConfig::default()).await;

        let task_id = router
            .route_fire_and_forget(Task::new("echo", json!(42)).with_id("ff-1"))
            .unwrap();
        assert_eq!(task_id, "ff-1");

        let result = router
            .claim_result(&task_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.output, json!(42));
        assert!(router.claim_result(&task_id, Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_fire_and_forget_rejection_is_claimable() {
        let router = echo_router(CallosumConfig::default()).await;
        router.force_open("echo").unwrap();

        let error = router
            .route_fire_and_forget(Task::new("echo", Value::Null).with_id("ff-2"))
            .unwrap_err();
        assert!(matches!(error, TaskError::CircuitOpen { .. }));

        let stored = router
            .claim_result("ff-2", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(stored.error, Some(error));
    }

    #[tokio::test]
    async fn test_shutdown_stops_admission() {
        let router = echo_router(CallosumConfig::default()).await;
        router.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = router.route_and_wait(Task::new("echo", Value::Null)).await;
        assert_eq!(result.error, Some(TaskError::Shutdown));
        assert!(!router.is_accepting());
        assert_eq!(router.events().by_type(EventType::RouterShutdown, 1).len(), 1);

        // Second shutdown is a no-op
        router.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
