//! Concurrent load against a small capacity: the gate never overshoots and
//! every admitted task settles exactly once.

mod common;

use callosum_core::routing::{RouterBuilder, Task, TaskError, TaskStatus};
use common::{bounded_config, ScriptedConsumer};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CAPACITY: usize = 8;
const PRODUCERS: usize = 16;
const TASKS_PER_PRODUCER: usize = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_never_exceeds_capacity() {
    let mut config = bounded_config(CAPACITY);
    config.dispatch.max_concurrent_dispatches = 4;
    let consumer = Arc::new(ScriptedConsumer::slow(Duration::from_millis(1)));
    let router = Arc::new(
        RouterBuilder::new(config)
            .register_arc("hot", consumer.clone())
            .start()
            .await
            .unwrap(),
    );

    let done = Arc::new(AtomicBool::new(false));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let sampler = {
        let router = router.clone();
        let done = done.clone();
        let max_seen = max_seen.clone();
        tokio::spawn(async move {
            while !done.load(Ordering::Acquire) {
                if let Some(stats) = router.stats().destination("hot") {
                    max_seen.fetch_max(stats.in_flight, Ordering::AcqRel);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let completed = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let router = router.clone();
        let completed = completed.clone();
        let rejected = rejected.clone();
        producers.push(tokio::spawn(async move {
            for n in 0..TASKS_PER_PRODUCER {
                let task = Task::new("hot", json!({ "producer": producer, "n": n }))
                    .with_priority((n % 5) as u8 + 1);
                let result = router.route_and_wait(task).await;
                match (result.status, result.error) {
                    (TaskStatus::Completed, None) => {
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                    (TaskStatus::Failed, Some(TaskError::Backpressure { capacity, .. })) => {
                        assert_eq!(capacity, CAPACITY);
                        rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    other => panic!("unexpected outcome: {other:?}"),
                }
            }
        }));
    }

    for producer in producers {
        producer.await.unwrap();
    }
    done.store(true, Ordering::Release);
    sampler.await.unwrap();

    let total = PRODUCERS * TASKS_PER_PRODUCER;
    let completed = completed.load(Ordering::Relaxed);
    let rejected = rejected.load(Ordering::Relaxed);
    assert_eq!(completed + rejected, total);
    assert!(completed > 0);
    assert!(max_seen.load(Ordering::Acquire) <= CAPACITY);
    assert_eq!(consumer.calls() as usize, completed);

    let stats = router.stats();
    let hot = stats.destination("hot").unwrap();
    assert_eq!(hot.in_flight, 0);
    assert_eq!(hot.completed as usize, completed);
    assert_eq!(hot.rejected as usize, rejected);
    assert_eq!(stats.in_flight_tasks, 0);
    assert_eq!(stats.pending_results, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fire_and_forget_flood_settles_every_admitted_task() {
    let consumer = Arc::new(ScriptedConsumer::succeeding());
    let router = Arc::new(
        RouterBuilder::new(bounded_config(CAPACITY))
            .register_arc("flood", consumer.clone())
            .start()
            .await
            .unwrap(),
    );

    let mut admitted = Vec::new();
    let mut rejected = 0usize;
    for i in 0..200 {
        match router.route_fire_and_forget(Task::new("flood", json!(i))) {
            Ok(id) => admitted.push(id),
            Err(TaskError::Backpressure { .. }) => rejected += 1,
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
        if i % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }

    for id in &admitted {
        let result = router
            .claim_result(id, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
    }

    assert_eq!(admitted.len() + rejected, 200);
    assert_eq!(consumer.calls() as usize, admitted.len());
    assert_eq!(router.stats().destination("flood").unwrap().in_flight, 0);
}
