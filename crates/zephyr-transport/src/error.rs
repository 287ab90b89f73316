//! Error types for transport adapters.

use thiserror::Error;

/// Errors raised while building, starting or stopping a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No adapter exists for the requested protocol.
    #[error("Unsupported transport protocol: {protocol} (supported: {})", crate::SUPPORTED_PROTOCOLS.join(", "))]
    UnsupportedProtocol {
        /// Requested protocol name
        protocol: String,
    },

    /// An option in the transport option bag has the wrong type or value.
    #[error("Invalid transport option '{option}': {reason}")]
    InvalidOption {
        /// Option key
        option: String,
        /// What is wrong with it
        reason: String,
    },

    /// `start` was called while the serving loop is running.
    #[error("Transport '{transport}' is already running")]
    AlreadyRunning {
        /// Adapter name
        transport: &'static str,
    },

    /// The listener could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested bind address
        address: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The serving loop could not be launched.
    #[error("Transport '{transport}' failed: {message}")]
    Serve {
        /// Adapter name
        transport: &'static str,
        /// Failure description
        message: String,
    },
}

impl TransportError {
    /// Returns `true` if this is a bind failure.
    #[must_use]
    pub const fn is_bind_error(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }

    /// Returns `true` if the adapter was already running.
    #[must_use]
    pub const fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
