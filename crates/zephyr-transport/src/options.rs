//! Transport configuration and typed per-protocol options.
//!
//! Configuration arrives as a protocol name plus a loosely typed option bag;
//! each adapter reads its own typed options out of the bag, filling in the
//! documented defaults for anything omitted.

use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Default SSE port.
pub const DEFAULT_SSE_PORT: u16 = 26841;
/// Default streamable HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 26842;
/// Default bind host for network transports.
pub const DEFAULT_HOST: &str = "localhost";
/// Default stdio read buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Default per-request timeout for streamable HTTP.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Default keep-alive interval for SSE streams.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Protocol selector plus option bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Protocol name (`stdio`, `sse` or `http`)
    pub protocol: String,
    /// Protocol-specific options
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl TransportConfig {
    /// Creates a config for `protocol` with the given options.
    #[must_use]
    pub fn new(protocol: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            protocol: protocol.into(),
            options,
        }
    }

    /// Creates a config for `protocol` with every option defaulted.
    #[must_use]
    pub fn with_defaults(protocol: impl Into<String>) -> Self {
        Self::new(protocol, Map::new())
    }

    /// Sets one option.
    #[must_use]
    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

/// Options for the stdio adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdioOptions {
    /// Read buffer capacity
    pub buffer_size: usize,
}

impl Default for StdioOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StdioOptions {
    /// Reads stdio options from a bag.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOption`] for malformed values.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let bag = OptionBag(options);
        let buffer_size = bag.size("buffer_size", DEFAULT_BUFFER_SIZE)?;
        if buffer_size == 0 {
            return Err(invalid("buffer_size", "must be positive"));
        }
        Ok(Self { buffer_size })
    }
}

/// Options for the SSE adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseOptions {
    /// Bind host
    pub host: String,
    /// Bind port; 0 picks an ephemeral port
    pub port: u16,
    /// Permissive CORS headers
    pub cors: bool,
    /// Keep-alive interval on event streams
    pub keep_alive: Duration,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_SSE_PORT,
            cors: true,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

impl SseOptions {
    /// Reads SSE options from a bag.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOption`] for malformed values.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let bag = OptionBag(options);
        Ok(Self {
            host: bag.string("host", DEFAULT_HOST)?,
            port: bag.port("port", DEFAULT_SSE_PORT)?,
            cors: bag.boolean("cors", true)?,
            keep_alive: bag.duration("keep_alive", DEFAULT_KEEP_ALIVE)?,
        })
    }

    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for the streamable HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Bind host
    pub host: String,
    /// Bind port; 0 picks an ephemeral port
    pub port: u16,
    /// Upper bound on producing a response
    pub timeout: Duration,
    /// Permissive CORS headers
    pub cors: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            timeout: DEFAULT_HTTP_TIMEOUT,
            cors: false,
        }
    }
}

impl HttpOptions {
    /// Reads HTTP options from a bag.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOption`] for malformed values.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let bag = OptionBag(options);
        let timeout = bag.duration("timeout", DEFAULT_HTTP_TIMEOUT)?;
        if timeout.is_zero() {
            return Err(invalid("timeout", "must be positive"));
        }
        Ok(Self {
            host: bag.string("host", DEFAULT_HOST)?,
            port: bag.port("port", DEFAULT_HTTP_PORT)?,
            timeout,
            cors: bag.boolean("cors", false)?,
        })
    }

    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(option: &str, reason: impl Into<String>) -> TransportError {
    TransportError::InvalidOption {
        option: option.to_string(),
        reason: reason.into(),
    }
}

/// Typed accessors over an option bag. Absent or null keys yield the default.
struct OptionBag<'a>(&'a Map<String, Value>);

impl OptionBag<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    fn string(&self, key: &str, default: &str) -> Result<String> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(other) => Err(invalid(key, format!("expected a non-empty string, got {other}"))),
        }
    }

    fn port(&self, key: &str, default: u16) -> Result<u16> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let number = match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        number
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| invalid(key, format!("expected a port number 0-65535, got {value}")))
    }

    fn size(&self, key: &str, default: usize) -> Result<usize> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let number = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        number
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid(key, format!("expected a non-negative integer, got {value}")))
    }

    fn boolean(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
            Some(other) => Err(invalid(key, format!("expected a boolean, got {other}"))),
        }
    }

    fn duration(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::String(s)) => humantime::parse_duration(s.trim())
                .map_err(|e| invalid(key, format!("invalid duration '{s}': {e}"))),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .ok_or_else(|| invalid(key, format!("invalid duration {n}"))),
            Some(other) => Err(invalid(key, format!("expected a duration, got {other}"))),
        }
    }
}
