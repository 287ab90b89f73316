//! HTTP status surface.
//!
//! | Endpoint | Response |
//! |---|---|
//! | `GET /health` | transport health; 503 while the transport is down |
//! | `GET /metrics` | [`MetricsSnapshot`](crate::MetricsSnapshot) |
//! | `GET /plugins` | every plugin's status |
//! | `GET /plugins/{name}` | one plugin's status, or 404 |
//! | `POST /plugins/{name}/reload` | reloads a plugin |

use crate::error::{Result, ServerError};
use crate::metrics::MetricsCollector;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use zephyr_plugin::{PluginError, PluginManager};
use zephyr_registry::ToolRegistry;
use zephyr_transport::TransportAdapter;

const STOP_GRACE: Duration = Duration::from_secs(5);

/// Components the endpoints report on.
#[derive(Debug, Clone)]
pub struct MonitoringState {
    /// Active transport
    pub transport: Arc<dyn TransportAdapter>,
    /// Tool registry
    pub registry: Arc<ToolRegistry>,
    /// Plugin manager
    pub plugins: Arc<PluginManager>,
    /// Call metrics
    pub metrics: Arc<MetricsCollector>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `"healthy"` or `"unhealthy"`
    pub status: &'static str,
    /// Transport protocol name
    pub transport: &'static str,
    /// Whether the transport loop is alive
    pub transport_healthy: bool,
    /// Registered tools
    pub tools: usize,
    /// Server uptime
    pub uptime_seconds: u64,
}

/// Builds the monitoring router.
#[must_use]
pub fn router(state: MonitoringState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/plugins", get(list_plugins))
        .route("/plugins/{name}", get(get_plugin))
        .route("/plugins/{name}/reload", post(reload_plugin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<MonitoringState>) -> (StatusCode, Json<HealthReport>) {
    let healthy = state.transport.is_healthy();
    let report = HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" },
        transport: state.transport.name(),
        transport_healthy: healthy,
        tools: state.registry.len().await,
        uptime_seconds: state.metrics.uptime().await.as_secs(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

async fn metrics(State(state): State<MonitoringState>) -> Response {
    Json(state.metrics.snapshot().await).into_response()
}

async fn list_plugins(State(state): State<MonitoringState>) -> Response {
    Json(state.plugins.list_plugins().await).into_response()
}

async fn get_plugin(State(state): State<MonitoringState>, Path(name): Path<String>) -> Response {
    match state.plugins.get_plugin(&name).await {
        Some(status) => Json(status).into_response(),
        None => failure(StatusCode::NOT_FOUND, format!("plugin not found: {name}")),
    }
}

async fn reload_plugin(
    State(state): State<MonitoringState>,
    Path(name): Path<String>,
) -> Response {
    match state.plugins.reload_plugin(&name).await {
        Ok(()) => {
            info!(plugin = %name, "plugin reloaded via monitoring endpoint");
            Json(json!({ "status": "reloaded", "plugin": name })).into_response()
        }
        Err(e @ PluginError::NotDiscovered { .. }) => failure(StatusCode::NOT_FOUND, e),
        Err(e) => {
            warn!(plugin = %name, error = %e, "plugin reload failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

fn failure(code: StatusCode, message: impl std::fmt::Display) -> Response {
    (code, Json(json!({ "error": message.to_string() }))).into_response()
}

#[derive(Debug)]
struct Running {
    ct: CancellationToken,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Monitoring listener with start/stop control.
#[derive(Debug)]
pub struct MonitoringServer {
    host: String,
    port: u16,
    state: MonitoringState,
    running: Mutex<Option<Running>>,
}

impl MonitoringServer {
    /// Creates a server for `host:port`; nothing is bound until `start`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, state: MonitoringState) -> Self {
        Self {
            host: host.into(),
            port,
            state,
            running: Mutex::new(None),
        }
    }

    /// Binds the listener and starts serving until `parent` is cancelled.
    ///
    /// Starting a running server does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Monitoring`] if the address cannot be bound.
    pub async fn start(&self, parent: &CancellationToken) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref().filter(|r| !r.task.is_finished()) {
            return Ok(current.local_addr);
        }

        let address = format!("{}:{}", self.host, self.port);
        let bind_error = |source: std::io::Error| ServerError::Monitoring {
            address: address.clone(),
            source,
        };
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let ct = parent.child_token();
        let shutdown = ct.clone();
        let app = router(self.state.clone());
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "monitoring listener failed");
            }
        });

        info!(address = %local_addr, "monitoring server started");
        *running = Some(Running {
            ct,
            task,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stops serving. Stopping a stopped server does nothing.
    pub async fn stop(&self) {
        let Some(current) = self.running.lock().await.take() else {
            return;
        };
        current.ct.cancel();
        let mut task = current.task;
        if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
            warn!("monitoring server did not drain in time; aborting");
            task.abort();
        } else {
            info!("monitoring server stopped");
        }
    }

    /// Bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .await
            .as_ref()
            .filter(|r| !r.task.is_finished())
            .map(|r| r.local_addr)
    }
}
