//! Line-oriented stream transport.
//!
//! Serves one MCP session over a reader/writer pair, by default the process's
//! standard input and output. The session ends, and health drops, when the
//! peer closes its end of the stream.

use crate::adapter::{ServeSlot, TransportAdapter};
use crate::error::{Result, TransportError};
use crate::options::StdioOptions;
use async_trait::async_trait;
use rmcp::{ServerHandler, ServiceExt};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Boxed read half handed to the protocol engine.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half handed to the protocol engine.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Produces a fresh stream pair for each start.
pub type StreamFactory = Arc<dyn Fn() -> io::Result<(BoxedReader, BoxedWriter)> + Send + Sync>;

/// Adapter serving MCP over a byte stream.
pub struct StdioAdapter<S> {
    service: S,
    streams: StreamFactory,
    slot: ServeSlot,
}

impl<S> fmt::Debug for StdioAdapter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioAdapter")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<S> StdioAdapter<S>
where
    S: ServerHandler + Clone,
{
    /// Serves `service` over the process's stdin and stdout.
    #[must_use]
    pub fn new(service: S, options: StdioOptions) -> Self {
        let buffer_size = options.buffer_size;
        let streams: StreamFactory = Arc::new(move || {
            let reader: BoxedReader =
                Box::new(BufReader::with_capacity(buffer_size, tokio::io::stdin()));
            let writer: BoxedWriter = Box::new(tokio::io::stdout());
            Ok((reader, writer))
        });
        Self::with_streams(service, streams)
    }

    /// Serves `service` over streams produced by `streams`.
    #[must_use]
    pub fn with_streams(service: S, streams: StreamFactory) -> Self {
        Self {
            service,
            streams,
            slot: ServeSlot::new("stdio"),
        }
    }
}

#[async_trait]
impl<S> TransportAdapter for StdioAdapter<S>
where
    S: ServerHandler + Clone,
{
    async fn start(&self, ct: CancellationToken) -> Result<()> {
        let service = self.service.clone();
        let streams = Arc::clone(&self.streams);

        self.slot
            .start(&ct, move |session_ct| async move {
                let (reader, writer) = streams().map_err(|e| TransportError::Serve {
                    transport: "stdio",
                    message: format!("failed to open streams: {e}"),
                })?;

                let task = tokio::spawn(async move {
                    match service.serve_with_ct((reader, writer), session_ct).await {
                        Ok(running) => match running.waiting().await {
                            Ok(reason) => info!(reason = ?reason, "stdio session ended"),
                            Err(e) => warn!(error = %e, "stdio session task failed"),
                        },
                        Err(e) => warn!(error = %e, "stdio session ended before initialization"),
                    }
                });
                Ok((task, None))
            })
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.slot.stop().await
    }

    fn name(&self) -> &'static str {
        "stdio"
    }

    fn is_healthy(&self) -> bool {
        self.slot.is_healthy()
    }
}
