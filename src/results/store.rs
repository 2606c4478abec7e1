//! Result store.
//!
//! A single mutex guards the map; every critical section is O(1) except
//! [`ResultStore::reap_expired`]. Waiters poll rather than subscribe, so
//! delivery latency is bounded by the poll ceiling.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ResultsConfig;
use crate::results::backoff::PollBackoff;
use crate::routing::task::TaskResult;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultStoreError {
    #[error("A result for task '{task_id}' is already stored")]
    DuplicateResult { task_id: String },
}

#[derive(Debug)]
struct StoredResult {
    result: TaskResult,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct ResultStore {
    entries: Mutex<HashMap<String, StoredResult>>,
    poll: ResultsConfig,
}

impl ResultStore {
    pub fn new(poll: ResultsConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            poll,
        }
    }

    /// Insert a result.
    ///
    /// # Panics
    ///
    /// Panics if a result for the same task id is still stored; each task
    /// produces exactly one result.
    pub fn put(&self, task_id: &str, result: TaskResult) {
        if let Err(err) = self.try_put(task_id, result) {
            panic!("{err}");
        }
    }

    pub fn try_put(&self, task_id: &str, result: TaskResult) -> Result<(), ResultStoreError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(task_id) {
            return Err(ResultStoreError::DuplicateResult {
                task_id: task_id.to_string(),
            });
        }
        entries.insert(
            task_id.to_string(),
            StoredResult {
                result,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Remove and return a result without waiting
    pub fn take(&self, task_id: &str) -> Option<TaskResult> {
        self.entries.lock().remove(task_id).map(|stored| stored.result)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.lock().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait up to `timeout` for a result, removing it when found.
    ///
    /// Returns `None` on expiry and leaves the store untouched.
    pub async fn wait_for(&self, task_id: &str, timeout: Duration) -> Option<TaskResult> {
        let deadline = Instant::now() + timeout;
        let mut backoff = PollBackoff::from_config(&self.poll);

        loop {
            if let Some(result) = self.take(task_id) {
                return Some(result);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(task_id = %task_id, timeout_ms = timeout.as_millis() as u64, "⏳ Result wait expired");
                return None;
            }

            tokio::time::sleep(backoff.next_delay(deadline - now)).await;
        }
    }

    /// Drop results stored longer than `ttl`; returns the reaped task ids
    pub fn reap_expired(&self, ttl: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut reaped = Vec::new();
        self.entries.lock().retain(|task_id, stored| {
            let keep = now.duration_since(stored.stored_at) < ttl;
            if !keep {
                reaped.push(task_id.clone());
            }
            keep
        });
        reaped
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(ResultsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    fn result(task_id: &str) -> TaskResult {
        TaskResult::completed(task_id, json!("ok"), Duration::from_millis(1), 1)
    }

    #[test]
    fn test_put_take_is_single_delivery() {
        let store = ResultStore::default();
        store.put("t1", result("t1"));

        assert!(store.contains("t1"));
        assert_eq!(store.take("t1").map(|r| r.task_id), Some("t1".to_string()));
        assert!(store.take("t1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_put_is_rejected() {
        let store = ResultStore::default();
        store.put("t1", result("t1"));
        assert_eq!(
            store.try_put("t1", result("t1")),
            Err(ResultStoreError::DuplicateResult {
                task_id: "t1".to_string()
            })
        );
    }

    #[test]
    #[should_panic(expected = "already stored")]
    fn test_duplicate_put_panics() {
        let store = ResultStore::default();
        store.put("t1", result("t1"));
        store.put("t1", result("t1"));
    }

    #[tokio::test]
    async fn test_wait_for_returns_present_result_immediately() {
        let store = ResultStore::default();
        store.put("t1", result("t1"));

        let mut wait = task::spawn(store.wait_for("t1", Duration::from_secs(1)));
        let found = assert_ready!(wait.poll());
        assert!(found.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_sees_late_result() {
        let store = Arc::new(ResultStore::default());
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            writer.put("t1", result("t1"));
        });

        let found = store.wait_for("t1", Duration::from_secs(5)).await;
        assert_eq!(found.map(|r| r.task_id), Some("t1".to_string()));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out_without_side_effects() {
        let store = ResultStore::default();
        let start = Instant::now();

        let mut wait = task::spawn(store.wait_for("missing", Duration::from_millis(200)));
        assert_pending!(wait.poll());
        drop(wait);

        assert!(store.wait_for("missing", Duration::from_millis(200)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(300));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_expired() {
        let store = ResultStore::default();
        store.put("old", result("old"));
        tokio::time::advance(Duration::from_secs(10)).await;
        store.put("new", result("new"));

        let reaped = store.reap_expired(Duration::from_secs(5));
        assert_eq!(reaped, vec!["old".to_string()]);
        assert!(store.contains("new"));
    }
}
