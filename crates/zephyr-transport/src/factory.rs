//! Maps a protocol name and option bag to an adapter.

use crate::adapter::TransportAdapter;
use crate::error::{Result, TransportError};
use crate::http::HttpAdapter;
use crate::options::{HttpOptions, SseOptions, StdioOptions, TransportConfig};
use crate::sse::SseAdapter;
use crate::stdio::StdioAdapter;
use rmcp::ServerHandler;

/// Protocols the factory can build.
pub const SUPPORTED_PROTOCOLS: &[&str] = &["stdio", "sse", "http"];

/// Builds transport adapters from configuration.
///
/// # Examples
///
/// ```
/// use zephyr_transport::{TransportConfig, TransportFactory};
///
/// #[derive(Clone)]
/// struct Handler;
/// impl rmcp::ServerHandler for Handler {}
///
/// let adapter = TransportFactory::create(&TransportConfig::with_defaults("sse"), Handler).unwrap();
/// assert_eq!(adapter.name(), "sse");
/// assert!(!adapter.is_healthy());
///
/// let err = TransportFactory::create(&TransportConfig::with_defaults("grpc"), Handler).unwrap_err();
/// assert!(err.to_string().contains("grpc"));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportFactory;

impl TransportFactory {
    /// Creates the adapter for `config.protocol`, serving `service`.
    ///
    /// Omitted options take their documented defaults.
    ///
    /// # Errors
    ///
    /// - [`TransportError::UnsupportedProtocol`] for unknown protocols
    /// - [`TransportError::InvalidOption`] for malformed options
    pub fn create<S>(config: &TransportConfig, service: S) -> Result<Box<dyn TransportAdapter>>
    where
        S: ServerHandler + Clone,
    {
        match config.protocol.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Box::new(StdioAdapter::new(
                service,
                StdioOptions::from_options(&config.options)?,
            ))),
            "sse" => Ok(Box::new(SseAdapter::new(
                service,
                SseOptions::from_options(&config.options)?,
            ))),
            "http" => Ok(Box::new(HttpAdapter::new(
                service,
                HttpOptions::from_options(&config.options)?,
            ))),
            _ => Err(TransportError::UnsupportedProtocol {
                protocol: config.protocol.clone(),
            }),
        }
    }

    /// Protocol names accepted by [`TransportFactory::create`].
    #[must_use]
    pub const fn supported_protocols() -> &'static [&'static str] {
        SUPPORTED_PROTOCOLS
    }
}
