//! Error types for the Zephyr MCP server.
//!
//! Every crate in the workspace reports tool, registry and configuration
//! failures through [`Error`]. Plugin and transport crates layer their own
//! error enums on top and wrap this one where a tool hook is involved.
//!
//! # Examples
//!
//! ```
//! use zephyr_core::{Error, Result};
//!
//! fn lookup(name: &str) -> Result<()> {
//!     Err(Error::ToolNotFound {
//!         name: name.to_string(),
//!     })
//! }
//!
//! let err = lookup("echo").unwrap_err();
//! assert!(err.is_not_found());
//! ```

use thiserror::Error;

/// Main error type for the Zephyr MCP server.
#[derive(Error, Debug)]
pub enum Error {
    /// Tool rejected before registration.
    ///
    /// Raised when a tool reports an empty name or otherwise cannot be
    /// catalogued.
    #[error("Invalid tool: {reason}")]
    InvalidTool {
        /// Why the tool was rejected
        reason: String,
    },

    /// A tool with the same name is already registered.
    #[error("Tool already registered: {name}")]
    DuplicateTool {
        /// Name that collided
        name: String,
    },

    /// No tool is registered under the requested name.
    #[error("Tool not found: {name}")]
    ToolNotFound {
        /// Name that was looked up
        name: String,
    },

    /// The tool's initialize hook failed, so it was not registered.
    #[error("Failed to initialize tool '{name}': {source}")]
    ToolInitialization {
        /// Tool name
        name: String,
        /// Error returned by the hook
        #[source]
        source: Box<Self>,
    },

    /// Tool execution failed.
    ///
    /// This is the error a tool returns from `execute`; the dispatch layer
    /// converts it into a protocol-level error result.
    #[error("Tool '{tool}' failed: {message}")]
    ExecutionFailed {
        /// Tool name
        tool: String,
        /// Human-readable failure description
        message: String,
    },

    /// Invalid argument error.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation observed a cancellation signal and stopped.
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        /// Name of the cancelled operation
        operation: String,
    },

    /// Timeout error.
    #[error("Operation timed out after {duration:?}: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// Limit that was exceeded
        duration: std::time::Duration,
    },

    /// Configuration error.
    ///
    /// Raised when configuration cannot be read, parsed, or fails
    /// validation.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// Filesystem or stream failure with context.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What was being attempted
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Description of the serialization failure
        message: String,
        /// Underlying serde error
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A periodic discovery loop is already running for this registry.
    #[error("Periodic discovery is already running")]
    DiscoveryAlreadyRunning,

    /// One or more components failed to shut down cleanly.
    #[error("Shutdown completed with {} failure(s): {}", failures.len(), failures.join("; "))]
    Shutdown {
        /// Per-component failure descriptions
        failures: Vec<String>,
    },
}

impl Error {
    /// Creates an execution failure for `tool`.
    ///
    /// # Examples
    ///
    /// ```
    /// use zephyr_core::Error;
    ///
    /// let err = Error::execution("fileops", "path is required");
    /// assert_eq!(err.to_string(), "Tool 'fileops' failed: path is required");
    /// ```
    #[must_use]
    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. })
    }

    /// Returns `true` if this is a duplicate registration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use zephyr_core::Error;
    ///
    /// let err = Error::DuplicateTool {
    ///     name: "echo".to_string(),
    /// };
    /// assert!(err.is_duplicate());
    /// ```
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateTool { .. })
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }

    /// Returns `true` if the operation was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Result type alias for Zephyr operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = Error::ToolNotFound {
            name: "missing".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_duplicate());
    }

    #[test]
    fn test_initialization_error_includes_cause() {
        let err = Error::ToolInitialization {
            name: "echo".to_string(),
            source: Box::new(Error::ConfigError {
                message: "missing key".to_string(),
            }),
        };
        let display = err.to_string();
        assert!(display.contains("echo"));
        assert!(display.contains("missing key"));
    }

    #[test]
    fn test_shutdown_error_lists_failures() {
        let err = Error::Shutdown {
            failures: vec!["transport: timed out".to_string(), "plugin a".to_string()],
        };
        let display = err.to_string();
        assert!(display.starts_with("Shutdown completed with 2 failure(s)"));
        assert!(display.contains("transport: timed out; plugin a"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::SerializationError { source: Some(_), .. }));
    }

    #[test]
    fn test_cancelled_and_timeout_detection() {
        let cancelled = Error::Cancelled {
            operation: "execute".to_string(),
        };
        let timeout = Error::Timeout {
            operation: "execute".to_string(),
            duration: std::time::Duration::from_millis(250),
        };
        assert_eq!(
            timeout.to_string(),
            "Operation timed out after 250ms: execute"
        );
        assert!(cancelled.is_cancelled());
        assert!(timeout.is_timeout());
        assert!(!timeout.is_cancelled());
    }
}
