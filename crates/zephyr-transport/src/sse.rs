//! Event-stream-over-HTTP transport.
//!
//! Clients open an event stream on `/sse` and submit messages to
//! `/message`. `/health` answers `OK` while the listener is up.

use crate::adapter::{ServeSlot, TransportAdapter};
use crate::error::{Result, TransportError};
use crate::http::{bind, cors_layer, health};
use crate::options::SseOptions;
use async_trait::async_trait;
use axum::routing::get;
use rmcp::ServerHandler;
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use std::fmt;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Path of the event stream endpoint.
pub const SSE_PATH: &str = "/sse";

/// Path of the message submission endpoint.
pub const MESSAGE_PATH: &str = "/message";

/// Adapter serving MCP over server-sent events.
pub struct SseAdapter<S> {
    service: S,
    options: SseOptions,
    slot: ServeSlot,
}

impl<S> fmt::Debug for SseAdapter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseAdapter")
            .field("options", &self.options)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<S> SseAdapter<S>
where
    S: ServerHandler + Clone,
{
    /// Creates an adapter; nothing is bound until `start`.
    #[must_use]
    pub fn new(service: S, options: SseOptions) -> Self {
        Self {
            service,
            options,
            slot: ServeSlot::new("sse"),
        }
    }

    /// Options this adapter was built with.
    #[must_use]
    pub const fn options(&self) -> &SseOptions {
        &self.options
    }
}

#[async_trait]
impl<S> TransportAdapter for SseAdapter<S>
where
    S: ServerHandler + Clone,
{
    async fn start(&self, ct: CancellationToken) -> Result<()> {
        let service = self.service.clone();
        let options = self.options.clone();

        self.slot
            .start(&ct, move |serve_ct| async move {
                let listener = bind(&options.host, options.port).await?;
                let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
                    address: options.address(),
                    source,
                })?;

                let config = SseServerConfig {
                    bind: local_addr,
                    sse_path: SSE_PATH.to_string(),
                    post_path: MESSAGE_PATH.to_string(),
                    ct: serve_ct.clone(),
                    sse_keep_alive: Some(options.keep_alive),
                };
                let (sse_server, router) = SseServer::new(config);
                let mut router = router
                    .route("/health", get(health))
                    .layer(TraceLayer::new_for_http());
                if options.cors {
                    router = router.layer(cors_layer());
                }

                // Sessions are cancelled through `serve_ct`.
                let _sessions = sse_server.with_service(move || service.clone());

                let shutdown = serve_ct.clone();
                let task = tokio::spawn(async move {
                    let served = axum::serve(listener, router)
                        .with_graceful_shutdown(async move { shutdown.cancelled().await })
                        .await;
                    if let Err(e) = served {
                        warn!(error = %e, "sse listener failed");
                    }
                    serve_ct.cancel();
                });
                Ok((task, Some(local_addr)))
            })
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.slot.stop().await
    }

    fn name(&self) -> &'static str {
        "sse"
    }

    fn is_healthy(&self) -> bool {
        self.slot.is_healthy()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.slot.local_addr()
    }
}
