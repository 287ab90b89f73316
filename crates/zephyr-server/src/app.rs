//! Server lifecycle orchestration.
//!
//! [`App`] wires configuration, registry, plugin manager, dispatcher,
//! transport and monitoring together. Startup order:
//!
//! 1. discover plugins (fatal on failure)
//! 2. load every discovered plugin (failures are logged)
//! 3. start periodic discovery when enabled
//! 4. start the transport (fatal on failure)
//! 5. start monitoring when enabled (fatal on failure)
//!
//! Shutdown runs the reverse: transport, monitoring, plugins, registry.

use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::monitoring::{MonitoringServer, MonitoringState};
use crate::service::{ServerIdentity, ZephyrService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zephyr_core::{Config, Error};
use zephyr_plugin::{PluginLoader, PluginManager};
use zephyr_registry::{ToolDiscovery, ToolRegistry};
use zephyr_transport::{TransportAdapter, TransportConfig, TransportFactory};

/// How often `run` checks whether the transport loop is still alive.
const TRANSPORT_POLL: Duration = Duration::from_millis(500);

/// A configured server, ready to start.
#[derive(Debug)]
pub struct App {
    config: Config,
    registry: Arc<ToolRegistry>,
    plugins: Arc<PluginManager>,
    metrics: Arc<MetricsCollector>,
    service: ZephyrService,
    transport: Arc<dyn TransportAdapter>,
    monitoring: Option<MonitoringServer>,
    root: CancellationToken,
}

impl App {
    /// Builds every component from `config`; nothing runs yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured transport cannot be built.
    pub fn new(config: Config, loader: Arc<dyn PluginLoader>) -> Result<Self> {
        let (protocol, options) = config.transport_options();
        let transport = TransportConfig::new(protocol, options);
        Self::with_transport(config, loader, |service| {
            TransportFactory::create(&transport, service)
        })
    }

    /// Like [`App::new`], with the transport built by `make_transport`.
    ///
    /// # Errors
    ///
    /// Returns the error from `make_transport`.
    pub fn with_transport<F>(
        config: Config,
        loader: Arc<dyn PluginLoader>,
        make_transport: F,
    ) -> Result<Self>
    where
        F: FnOnce(ZephyrService) -> zephyr_transport::Result<Box<dyn TransportAdapter>>,
    {
        let metrics = Arc::new(MetricsCollector::new());
        let registry = Arc::new(ToolRegistry::new());
        let plugins = Arc::new(
            PluginManager::new(
                config.plugins.discovery.directories.clone(),
                Arc::clone(&registry),
                loader,
            )
            .with_disabled(config.disabled_tools()),
        );

        let identity = ServerIdentity {
            name: config.server.name.clone(),
            version: config.server.version.clone(),
        };
        let service = ZephyrService::new(Arc::clone(&registry), Arc::clone(&metrics), identity)
            .with_request_timeout(config.security.timeout.request);
        let transport: Arc<dyn TransportAdapter> = make_transport(service.clone())?.into();

        let monitoring = config.monitoring.enabled.then(|| {
            MonitoringServer::new(
                config.monitoring.host.clone(),
                config.monitoring.port,
                MonitoringState {
                    transport: Arc::clone(&transport),
                    registry: Arc::clone(&registry),
                    plugins: Arc::clone(&plugins),
                    metrics: Arc::clone(&metrics),
                },
            )
        });

        Ok(Self {
            config,
            registry,
            plugins,
            metrics,
            service,
            transport,
            monitoring,
            root: CancellationToken::new(),
        })
    }

    /// Starts every component in order.
    ///
    /// Plugin load failures are logged and do not stop startup. If the
    /// transport or monitoring server cannot start, everything started so
    /// far is shut down again.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin directories cannot be scanned or a
    /// listener cannot be started.
    pub async fn start(&self) -> Result<()> {
        let discovered = self.plugins.discover_plugins().await?;
        info!(count = discovered.len(), "plugins discovered");

        match self.plugins.load_all_plugins().await {
            Ok(summary) => info!(
                loaded = summary.loaded.len(),
                skipped = summary.skipped.len(),
                "plugins loaded"
            ),
            Err(e) => warn!(error = %e, "some plugins failed to load"),
        }

        let discovery = &self.config.plugins.discovery;
        if discovery.enabled {
            let source: Arc<dyn ToolDiscovery> = Arc::clone(&self.plugins) as _;
            self.registry
                .start_periodic_discovery(discovery.scan_interval, source, &self.root)
                .await?;
        }

        if let Err(e) = self.transport.start(self.root.child_token()).await {
            self.unwind().await;
            return Err(e.into());
        }

        if let Some(monitoring) = &self.monitoring
            && let Err(e) = monitoring.start(&self.root).await
        {
            self.unwind().await;
            return Err(e);
        }

        let tools = self.registry.len().await;
        info!(
            name = %self.config.server.name,
            transport = self.transport.name(),
            tools,
            "server started"
        );
        Ok(())
    }

    /// Starts the server and serves until a shutdown signal, root
    /// cancellation, or the transport loop ending; then shuts down.
    ///
    /// # Errors
    ///
    /// Returns startup errors, or [`Error::Shutdown`] if shutdown was not
    /// clean.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;

        tokio::select! {
            () = shutdown_signal() => info!("shutdown signal received"),
            () = self.root.cancelled() => info!("cancellation requested"),
            () = transport_exited(self.transport.as_ref()) => {
                info!(transport = self.transport.name(), "transport closed");
            }
        }

        self.shutdown().await?;
        Ok(())
    }

    /// Stops every component in reverse start order.
    ///
    /// Every step runs even if an earlier one failed. The whole sequence is
    /// bounded by `security.timeout.shutdown`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] listing each failed step.
    pub async fn shutdown(&self) -> zephyr_core::Result<()> {
        let limit = self.config.security.timeout.shutdown;
        let failures = match tokio::time::timeout(limit, self.shutdown_steps()).await {
            Ok(failures) => failures,
            Err(_) => vec![format!("shutdown timed out after {limit:?}")],
        };

        if failures.is_empty() {
            info!("shutdown complete");
            Ok(())
        } else {
            warn!(failures = ?failures, "shutdown completed with failures");
            Err(Error::Shutdown { failures })
        }
    }

    async fn shutdown_steps(&self) -> Vec<String> {
        info!("shutting down");
        self.root.cancel();
        self.registry.stop_periodic_discovery().await;

        let mut failures = Vec::new();
        if let Err(e) = self.transport.stop().await {
            failures.push(format!("transport: {e}"));
        }
        if let Some(monitoring) = &self.monitoring {
            monitoring.stop().await;
        }
        if let Err(e) = self.plugins.unload_all_plugins().await {
            failures.push(format!("plugins: {e}"));
        }
        failures.extend(self.registry.shutdown().await);
        failures
    }

    async fn unwind(&self) {
        if let Err(e) = self.shutdown().await {
            warn!(error = %e, "cleanup after failed start was incomplete");
        }
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Tool registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Plugin manager.
    #[must_use]
    pub const fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// Call metrics.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Protocol handler shared by every transport session.
    #[must_use]
    pub const fn service(&self) -> &ZephyrService {
        &self.service
    }

    /// Active transport.
    #[must_use]
    pub const fn transport(&self) -> &Arc<dyn TransportAdapter> {
        &self.transport
    }

    /// Root cancellation token; cancelling it makes `run` shut down.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.root
    }

    /// Bound monitoring address while the monitoring server runs.
    pub async fn monitoring_addr(&self) -> Option<SocketAddr> {
        match &self.monitoring {
            Some(monitoring) => monitoring.local_addr().await,
            None => None,
        }
    }
}

async fn transport_exited(transport: &dyn TransportAdapter) {
    let mut ticker = tokio::time::interval(TRANSPORT_POLL);
    loop {
        ticker.tick().await;
        if !transport.is_healthy() {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
