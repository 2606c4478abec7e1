//! Transport failures at startup fall back to direct mode with the same
//! admission rules.

mod common;

use async_trait::async_trait;
use callosum_core::events::EventType;
use callosum_core::resilience::CircuitState;
use callosum_core::routing::{
    consumer_fn, RouterBuilder, RouterMode, Task, TaskError, TaskStatus, Transport,
};
use common::{bounded_config, fast_config, GatedConsumer, ScriptedConsumer};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct BrokenTransport;

#[async_trait]
impl Transport for BrokenTransport {
    async fn bring_up(&self) -> anyhow::Result<()> {
        anyhow::bail!("broker refused connection")
    }

    fn name(&self) -> &str {
        "broken"
    }
}

struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn bring_up(&self) -> anyhow::Result<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

#[tokio::test]
async fn test_failed_transport_runs_consumers_inline() {
    let router = RouterBuilder::new(fast_config())
        .transport(BrokenTransport)
        .register(
            "echo",
            consumer_fn(|payload: Value| async move { Ok(json!({ "direct": payload })) }),
        )
        .start()
        .await
        .unwrap();

    assert_eq!(router.mode(), RouterMode::Direct);
    assert!(router
        .degraded_reason()
        .unwrap()
        .contains("broker refused connection"));

    let result = router.route_and_wait(Task::new("echo", json!(1))).await;
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.output, json!({"direct": 1}));

    let degraded = router.events().by_type(EventType::RouterDegraded, 1);
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].payload_str("transport"), Some("broken"));
    assert!(router.events().by_type(EventType::TaskQueued, 1).is_empty());
    assert_eq!(router.stats().destination("echo").unwrap().queue_depth, 0);
}

#[tokio::test(start_paused = true)]
async fn test_startup_timeout_degrades() {
    let mut config = fast_config();
    config.router.router_startup_timeout_ms = 250;
    let router = RouterBuilder::new(config)
        .transport(HangingTransport)
        .register("echo", ScriptedConsumer::succeeding())
        .start()
        .await
        .unwrap();

    assert_eq!(router.mode(), RouterMode::Direct);
    assert!(router.degraded_reason().unwrap().contains("250ms"));
    assert_eq!(router.stats().transport, "hanging");
}

#[tokio::test]
async fn test_direct_mode_unknown_destination_is_unavailable() {
    let router = RouterBuilder::new(fast_config())
        .transport(BrokenTransport)
        .register("echo", ScriptedConsumer::succeeding())
        .start()
        .await
        .unwrap();

    let result = router.route_and_wait(Task::new("elsewhere", Value::Null)).await;
    assert_eq!(result.status, TaskStatus::Failed);
    assert!(matches!(
        result.error,
        Some(TaskError::RouterUnavailable { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_direct_mode_keeps_circuit_breaker() {
    let mut config = fast_config();
    config.dispatch.max_retries = 0;
    config.circuit_breaker.failure_threshold = 2;
    let consumer = Arc::new(ScriptedConsumer::failing());
    let router = RouterBuilder::new(config)
        .transport(BrokenTransport)
        .register_arc("flaky", consumer.clone())
        .start()
        .await
        .unwrap();

    for _ in 0..2 {
        let result = router.route_and_wait(Task::new("flaky", Value::Null)).await;
        assert!(matches!(
            result.error,
            Some(TaskError::ConsumerFailure { .. })
        ));
    }
    assert_eq!(
        router.stats().destination("flaky").unwrap().breaker_state,
        CircuitState::Open
    );

    let result = router.route_and_wait(Task::new("flaky", Value::Null)).await;
    assert!(matches!(result.error, Some(TaskError::CircuitOpen { .. })));
    assert_eq!(consumer.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_direct_mode_deadline_counts_as_breaker_failure() {
    let mut config = fast_config();
    config.dispatch.max_retries = 2;
    config.circuit_breaker.failure_threshold = 1;
    let router = RouterBuilder::new(config)
        .transport(BrokenTransport)
        .register("slow", ScriptedConsumer::slow(Duration::from_millis(80)))
        .start()
        .await
        .unwrap();

    // The retry after the first missed deadline overruns the caller's budget
    let result = router
        .route_and_wait(Task::new("slow", Value::Null).with_timeout(Duration::from_millis(50)))
        .await;
    assert_eq!(result.status, TaskStatus::TimedOut);
    assert_eq!(
        router.stats().destination("slow").unwrap().breaker_state,
        CircuitState::Open
    );
}

#[tokio::test]
async fn test_direct_mode_backpressure_counts_inline_calls() {
    let consumer = Arc::new(GatedConsumer::new());
    let router = Arc::new(
        RouterBuilder::new(bounded_config(1))
            .transport(BrokenTransport)
            .register_arc("gated", consumer.clone())
            .start()
            .await
            .unwrap(),
    );

    let first = {
        let router = router.clone();
        tokio::spawn(async move { router.route_and_wait(Task::new("gated", json!(1))).await })
    };
    consumer.wait_started().await;

    let second = router.route_and_wait(Task::new("gated", json!(2))).await;
    assert!(matches!(
        second.error,
        Some(TaskError::Backpressure { capacity: 1, .. })
    ));

    consumer.release(1);
    let first = first.await.unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
    assert_eq!(router.stats().destination("gated").unwrap().in_flight, 0);
}

#[tokio::test]
async fn test_direct_mode_fire_and_forget_is_claimable() {
    let router = RouterBuilder::new(fast_config())
        .transport(BrokenTransport)
        .register("echo", ScriptedConsumer::succeeding())
        .start()
        .await
        .unwrap();

    let id = router
        .route_fire_and_forget(Task::new("echo", json!("bg")))
        .unwrap();
    let result = router
        .claim_result(&id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.output, json!("bg"));
}
