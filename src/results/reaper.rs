//! Background reaper for unclaimed results.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{EventBus, EventType};
use crate::results::store::ResultStore;

/// Handle to the running reaper task
#[derive(Debug)]
pub struct ResultReaper {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl ResultReaper {
    /// Sweep `store` every `interval`, dropping results older than `ttl`
    pub fn start(
        store: Arc<ResultStore>,
        events: Arc<EventBus>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = store.reap_expired(ttl);
                        if reaped.is_empty() {
                            continue;
                        }
                        debug!(count = reaped.len(), ttl_ms = ttl.as_millis() as u64, "🧹 Reaped unclaimed results");
                        for task_id in reaped {
                            events.emit(EventType::ResultReaped, json!({ "task_id": task_id }));
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("🧹 Result reaper shutting down");
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx, handle }
    }

    /// Stop the reaper and wait for its task to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
