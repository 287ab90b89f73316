//! Streamable HTTP transport, plus the HTTP plumbing shared with SSE.
//!
//! The MCP endpoint is mounted at `/mcp`; `/health` answers `OK` while the
//! listener is up. Each request must produce its response within the
//! configured timeout; streamed bodies are not cut off.

use crate::adapter::{ServeSlot, TransportAdapter};
use crate::error::{Result, TransportError};
use crate::options::HttpOptions;
use async_trait::async_trait;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use rmcp::ServerHandler;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Path of the streamable MCP endpoint.
pub const MCP_PATH: &str = "/mcp";

/// Adapter serving MCP over streamable HTTP.
pub struct HttpAdapter<S> {
    service: S,
    options: HttpOptions,
    slot: ServeSlot,
}

impl<S> fmt::Debug for HttpAdapter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAdapter")
            .field("options", &self.options)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<S> HttpAdapter<S>
where
    S: ServerHandler + Clone,
{
    /// Creates an adapter; nothing is bound until `start`.
    #[must_use]
    pub fn new(service: S, options: HttpOptions) -> Self {
        Self {
            service,
            options,
            slot: ServeSlot::new("http"),
        }
    }

    /// Options this adapter was built with.
    #[must_use]
    pub const fn options(&self) -> &HttpOptions {
        &self.options
    }

    fn router(&self) -> Router {
        let service = self.service.clone();
        let mcp = StreamableHttpService::new(
            move || Ok(service.clone()),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig::default(),
        );

        let router = Router::new()
            .nest_service(MCP_PATH, mcp)
            .route("/health", get(health))
            .layer(middleware::from_fn_with_state(
                self.options.timeout,
                enforce_timeout,
            ))
            .layer(TraceLayer::new_for_http());

        if self.options.cors {
            router.layer(cors_layer())
        } else {
            router
        }
    }
}

#[async_trait]
impl<S> TransportAdapter for HttpAdapter<S>
where
    S: ServerHandler + Clone,
{
    async fn start(&self, ct: CancellationToken) -> Result<()> {
        let router = self.router();
        let options = self.options.clone();

        self.slot
            .start(&ct, move |serve_ct| async move {
                let listener = bind(&options.host, options.port).await?;
                let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
                    address: options.address(),
                    source,
                })?;

                let task = tokio::spawn(async move {
                    let served = axum::serve(listener, router)
                        .with_graceful_shutdown(async move { serve_ct.cancelled().await })
                        .await;
                    if let Err(e) = served {
                        warn!(error = %e, "http listener failed");
                    }
                });
                Ok((task, Some(local_addr)))
            })
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.slot.stop().await
    }

    fn name(&self) -> &'static str {
        "http"
    }

    fn is_healthy(&self) -> bool {
        self.slot.is_healthy()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.slot.local_addr()
    }
}

/// Binds a listener, reporting the requested address on failure.
pub(crate) async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|source| TransportError::Bind {
            address: format!("{host}:{port}"),
            source,
        })
}

/// Permissive CORS policy for browser clients.
pub(crate) fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub(crate) async fn health() -> &'static str {
    "OK"
}

async fn enforce_timeout(
    State(timeout): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => (StatusCode::REQUEST_TIMEOUT, "request timed out").into_response(),
    }
}
