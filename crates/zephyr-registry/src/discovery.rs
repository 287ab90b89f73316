//! Periodic discovery loop.
//!
//! The registry can rescan for tools on a fixed interval. What a rescan does
//! is supplied by a [`ToolDiscovery`] implementation; the plugin manager
//! provides one that picks up newly added plugin directories.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zephyr_core::Result;

/// A source of tools polled by the periodic discovery loop.
#[async_trait]
pub trait ToolDiscovery: Send + Sync {
    /// Performs one discovery pass.
    ///
    /// # Errors
    ///
    /// Errors are logged by the loop and do not stop it.
    async fn discover(&self) -> Result<()>;
}

/// Handle to a running discovery loop.
#[derive(Debug)]
pub(crate) struct DiscoveryTask {
    ct: CancellationToken,
    handle: JoinHandle<()>,
}

impl DiscoveryTask {
    /// Spawns the loop under a child of `parent`. The first pass runs one
    /// full `interval` after start.
    ///
    /// Cancellation is only observed between passes; a pass in progress
    /// always runs to completion.
    pub(crate) fn spawn(
        interval: Duration,
        source: Arc<dyn ToolDiscovery>,
        parent: &CancellationToken,
    ) -> Self {
        let ct = parent.child_token();
        let loop_ct = ct.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = loop_ct.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if let Err(e) = source.discover().await {
                    warn!(error = %e, "periodic discovery pass failed");
                }
            }
            debug!("periodic discovery loop exited");
        });

        Self { ct, handle }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals the loop and waits for it to exit.
    pub(crate) async fn stop(self) {
        self.ct.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "periodic discovery task ended abnormally");
        }
    }
}
