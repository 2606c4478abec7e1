//! Transport collaborator brought up when the router starts.
//!
//! When bring-up fails or exceeds the startup timeout the router runs in
//! direct mode instead of refusing to start.

use async_trait::async_trait;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn bring_up(&self) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Queues and dispatchers inside this process; always available
#[derive(Debug, Default, Clone)]
pub struct InProcessTransport;

#[async_trait]
impl Transport for InProcessTransport {
    async fn bring_up(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "in_process"
    }
}
