//! # Router Bootstrap
//!
//! Builds a [`Router`] from configuration and registered consumers. The
//! transport is brought up under `router_startup_timeout`; if it fails or
//! stalls the router still starts, in [`RouterMode::Direct`].

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{CallosumConfig, ConfigManager};
use crate::error::Result;
use crate::events::EventBus;
use crate::logging::log_error;
use crate::routing::consumer::Consumer;
use crate::routing::registry::{Destination, DestinationRegistry};
use crate::routing::router::{Router, RouterMode};
use crate::routing::transport::{InProcessTransport, Transport};

pub struct RouterBuilder {
    config: CallosumConfig,
    consumers: Vec<(String, Arc<dyn Consumer>)>,
    transport: Arc<dyn Transport>,
    events: Option<Arc<EventBus>>,
}

impl RouterBuilder {
    pub fn new(config: CallosumConfig) -> Self {
        Self {
            config,
            consumers: Vec::new(),
            transport: Arc::new(InProcessTransport),
            events: None,
        }
    }

    /// Start from a loaded configuration
    pub fn from_config_manager(manager: &ConfigManager) -> Self {
        Self::new(manager.config().clone())
    }

    /// Register the consumer for one destination tract
    pub fn register(self, destination: impl Into<String>, consumer: impl Consumer + 'static) -> Self {
        self.register_arc(destination, Arc::new(consumer))
    }

    pub fn register_arc(mut self, destination: impl Into<String>, consumer: Arc<dyn Consumer>) -> Self {
        self.consumers.push((destination.into(), consumer));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Share an existing bus, e.g. to subscribe observers before start
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate, bring up the transport and start dispatchers.
    ///
    /// Fails only on invalid configuration or registration; transport
    /// failures degrade to direct mode instead.
    #[instrument(skip(self), fields(transport = %self.transport.name()))]
    pub async fn start(self) -> Result<Router> {
        info!(
            destinations = self.consumers.len(),
            "🚀 ROUTER: Starting router bootstrap"
        );

        self.config.validate()?;

        let events = self
            .events
            .unwrap_or_else(|| Arc::new(EventBus::new(&self.config.events)));

        let mut registry = DestinationRegistry::new();
        for (name, consumer) in self.consumers {
            registry.insert(Destination::new(name, consumer, &self.config, events.clone()))?;
        }

        let transport_name = self.transport.name().to_string();
        let startup_timeout = self.config.router.router_startup_timeout();

        let degraded_reason =
            match tokio::time::timeout(startup_timeout, self.transport.bring_up()).await {
                Ok(Ok(())) => {
                    info!(transport = %transport_name, "✅ ROUTER: Transport ready");
                    None
                }
                Ok(Err(error)) => {
                    log_error(
                        "router",
                        "transport_bring_up",
                        &format!("{error:#}"),
                        Some(&transport_name),
                    );
                    Some(format!("transport '{transport_name}' failed to start: {error:#}"))
                }
                Err(_) => {
                    warn!(
                        transport = %transport_name,
                        timeout_ms = startup_timeout.as_millis() as u64,
                        "⏰ ROUTER: Transport startup timed out"
                    );
                    Some(format!(
                        "transport '{transport_name}' did not start within {}ms",
                        startup_timeout.as_millis()
                    ))
                }
            };

        let mode = if degraded_reason.is_some() {
            RouterMode::Direct
        } else {
            RouterMode::Routed
        };

        Ok(Router::launch(
            self.config,
            mode,
            degraded_reason,
            transport_name,
            registry,
            events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::routing::consumer::consumer_fn;
    use async_trait::async_trait;
    use serde_json::Value;

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn bring_up(&self) -> anyhow::Result<()> {
            anyhow::bail!("broker unreachable")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn bring_up(&self) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn echo() -> impl Consumer {
        consumer_fn(|payload: Value| async move { Ok(payload) })
    }

    #[tokio::test]
    async fn test_in_process_transport_routes() {
        let router = RouterBuilder::new(CallosumConfig::default())
            .register("echo", echo())
            .start()
            .await
            .unwrap();

        assert_eq!(router.mode(), RouterMode::Routed);
        assert!(router.degraded_reason().is_none());
        assert_eq!(router.events().by_type(EventType::RouterStarted, 1).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_transport_degrades() {
        let router = RouterBuilder::new(CallosumConfig::default())
            .register("echo", echo())
            .transport(FailingTransport)
            .start()
            .await
            .unwrap();

        assert_eq!(router.mode(), RouterMode::Direct);
        assert!(router
            .degraded_reason()
            .is_some_and(|reason| reason.contains("broker unreachable")));
        assert_eq!(router.events().by_type(EventType::RouterDegraded, 1).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_transport_times_out_into_direct_mode() {
        let mut config = CallosumConfig::default();
        config.router.router_startup_timeout_ms = 500;

        let router = RouterBuilder::new(config)
            .register("echo", echo())
            .transport(StalledTransport)
            .start()
            .await
            .unwrap();

        assert_eq!(router.mode(), RouterMode::Direct);
        assert!(router
            .degraded_reason()
            .is_some_and(|reason| reason.contains("500ms")));
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let result = RouterBuilder::new(CallosumConfig::default())
            .register("echo", echo())
            .register("echo", echo())
            .start()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_fails() {
        let mut config = CallosumConfig::default();
        config.backpressure.queue_capacity_per_destination = 0;

        let result = RouterBuilder::new(config).start().await;
        assert!(result.is_err());
    }
}
