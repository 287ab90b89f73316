//! The transport adapter contract and its shared lifecycle state.
//!
//! Every adapter moves through Stopped → Starting → Running → Stopping →
//! Stopped. [`ServeSlot`] owns that state machine so the three adapters only
//! differ in how they launch their serving loop.

use crate::error::{Result, TransportError};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `stop` waits for in-flight work before forcing the loop down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Uniform control interface over one protocol listener.
#[async_trait]
pub trait TransportAdapter: Send + Sync + fmt::Debug {
    /// Launches the serving loop.
    ///
    /// Listeners are bound before this returns, so a bind failure is
    /// reported here. The loop stops when `ct` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`TransportError::AlreadyRunning`] if the loop is running
    /// - [`TransportError::Bind`] if the listener cannot be bound
    async fn start(&self, ct: CancellationToken) -> Result<()>;

    /// Stops the serving loop, waiting at most [`SHUTDOWN_GRACE`].
    ///
    /// Stopping a stopped adapter does nothing.
    ///
    /// # Errors
    ///
    /// Reserved for adapters whose teardown can fail; the bundled adapters
    /// always succeed.
    async fn stop(&self) -> Result<()>;

    /// Protocol name, e.g. `"sse"`.
    fn name(&self) -> &'static str;

    /// `true` only while the serving loop is alive.
    fn is_healthy(&self) -> bool;

    /// Bound address for network adapters.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A running loop: its cancellation token, its task and its bound address.
#[derive(Debug)]
pub(crate) struct ServeHandle {
    ct: CancellationToken,
    task: JoinHandle<()>,
    local_addr: Option<SocketAddr>,
}

impl ServeHandle {
    fn is_alive(&self) -> bool {
        !self.task.is_finished() && !self.ct.is_cancelled()
    }
}

/// Lifecycle state shared by every adapter.
///
/// `transition` serializes start and stop; `handle` is only held briefly so
/// health checks never wait behind a slow stop.
#[derive(Debug)]
pub(crate) struct ServeSlot {
    name: &'static str,
    grace: Duration,
    transition: tokio::sync::Mutex<()>,
    handle: Mutex<Option<ServeHandle>>,
}

impl ServeSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            grace: SHUTDOWN_GRACE,
            transition: tokio::sync::Mutex::new(()),
            handle: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs `launch` with a child of `parent` and records the loop it spawns.
    pub(crate) async fn start<F, Fut>(&self, parent: &CancellationToken, launch: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<(JoinHandle<()>, Option<SocketAddr>)>> + Send,
    {
        let _transition = self.transition.lock().await;
        if self.is_healthy() {
            return Err(TransportError::AlreadyRunning {
                transport: self.name,
            });
        }

        // A loop that exited on its own leaves a finished handle behind.
        if self.take().is_some() {
            debug!(transport = self.name, "discarding handle of exited serving loop");
        }

        let ct = parent.child_token();
        let (task, local_addr) = launch(ct.clone()).await?;
        *self.lock() = Some(ServeHandle {
            ct,
            task,
            local_addr,
        });

        info!(transport = self.name, address = ?local_addr, "transport started");
        Ok(())
    }

    /// Cancels the loop and waits for it, aborting after the grace period.
    pub(crate) async fn stop(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        let Some(handle) = self.take() else {
            return Ok(());
        };

        handle.ct.cancel();
        let mut task = handle.task;
        match tokio::time::timeout(self.grace, &mut task).await {
            Ok(Ok(())) => info!(transport = self.name, "transport stopped"),
            Ok(Err(e)) => warn!(transport = self.name, error = %e, "serving loop ended abnormally"),
            Err(_) => {
                warn!(
                    transport = self.name,
                    grace = ?self.grace,
                    "serving loop did not drain in time; forcing shutdown"
                );
                task.abort();
            }
        }
        Ok(())
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.lock().as_ref().is_some_and(ServeHandle::is_alive)
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().and_then(|h| h.local_addr)
    }

    fn take(&self) -> Option<ServeHandle> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ServeHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
