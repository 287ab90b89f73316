//! Error types for server startup.

use thiserror::Error;
use zephyr_plugin::PluginError;
use zephyr_transport::TransportError;

/// Errors that stop the server from starting.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration, registry or shutdown failure.
    #[error(transparent)]
    Core(#[from] zephyr_core::Error),

    /// Plugin directories could not be scanned.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// The transport could not be built or started.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The monitoring listener could not be bound.
    #[error("Failed to bind monitoring server on {address}: {source}")]
    Monitoring {
        /// Requested bind address
        address: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    /// Returns `true` if a listener failed to bind.
    #[must_use]
    pub const fn is_bind_error(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_bind_error(),
            Self::Monitoring { .. } => true,
            Self::Core(_) | Self::Plugin(_) => false,
        }
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
