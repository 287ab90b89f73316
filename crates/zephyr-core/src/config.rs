//! Server configuration.
//!
//! Configuration is resolved in three layers: built-in defaults, an optional
//! YAML file, then `ZEPHYR_*` environment overrides. The resulting [`Config`]
//! is built once by the entry point and passed down explicitly.
//!
//! # Examples
//!
//! ```
//! use zephyr_core::Config;
//!
//! let config = Config::from_yaml_str("transport:\n  protocol: sse\n").unwrap();
//! assert_eq!(config.transport.protocol, "sse");
//! assert_eq!(config.transport.sse.port, 26841);
//! assert!(config.validate().is_ok());
//! ```

use crate::{Error, JsonObject, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport protocols the server can be configured with.
pub const SUPPORTED_PROTOCOLS: &[&str] = &["stdio", "sse", "http"];

/// Accepted log levels.
pub const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];

/// Accepted log formats.
pub const LOG_FORMATS: &[&str] = &["json", "text"];

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server identity
    pub server: ServerConfig,
    /// Transport selection and per-protocol options
    pub transport: TransportSettings,
    /// Plugin discovery and per-tool flags
    pub plugins: PluginsConfig,
    /// Log level and format
    pub logging: LoggingConfig,
    /// Timeouts
    pub security: SecurityConfig,
    /// Monitoring HTTP surface
    pub monitoring: MonitoringConfig,
}

/// Server identity reported to protocol clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Implementation name
    pub name: String,
    /// Implementation version
    pub version: String,
    /// Forces debug logging when set
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "zephyr-mcp-server".to_string(),
            version: "1.0.0".to_string(),
            debug: false,
        }
    }
}

/// Transport selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// One of [`SUPPORTED_PROTOCOLS`]
    pub protocol: String,
    /// Line-oriented stream options
    pub stdio: StdioSettings,
    /// Event-stream-over-HTTP options
    pub sse: SseSettings,
    /// Streamable HTTP options
    pub http: HttpSettings,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            protocol: "stdio".to_string(),
            stdio: StdioSettings::default(),
            sse: SseSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

/// Options for the stdio transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdioSettings {
    /// Read buffer capacity in bytes
    pub buffer_size: usize,
}

impl Default for StdioSettings {
    fn default() -> Self {
        Self { buffer_size: 4096 }
    }
}

/// Options for the SSE transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Adds permissive CORS headers
    pub cors_enabled: bool,
}

impl Default for SseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 26841,
            cors_enabled: true,
        }
    }
}

/// Options for the streamable HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Per-request timeout
    #[serde(with = "duration_format")]
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 26842,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Plugin system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory scanning
    pub discovery: DiscoveryConfig,
    /// Per-tool flags and settings, keyed by tool name
    pub tools: BTreeMap<String, ToolConfig>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        let mut currenttime = JsonObject::new();
        currenttime.insert("timezone".to_string(), "UTC".into());

        let mut tools = BTreeMap::new();
        tools.insert("systeminfo".to_string(), ToolConfig::default());
        tools.insert(
            "currenttime".to_string(),
            ToolConfig {
                enabled: true,
                settings: currenttime,
            },
        );

        Self {
            discovery: DiscoveryConfig::default(),
            tools,
        }
    }
}

/// Plugin discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Enables the periodic rescan
    pub enabled: bool,
    /// Base directories, scanned in order
    pub directories: Vec<PathBuf>,
    /// Interval between rescans
    #[serde(with = "duration_format")]
    pub scan_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directories: vec![PathBuf::from("./plugins")],
            scan_interval: Duration::from_secs(60),
        }
    }
}

/// Per-tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Disabled tools are never loaded
    pub enabled: bool,
    /// Free-form tool settings
    pub settings: JsonObject,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: JsonObject::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of [`LOG_LEVELS`]
    pub level: String,
    /// One of [`LOG_FORMATS`]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Security-related settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Request and shutdown bounds
    pub timeout: TimeoutConfig,
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for a single tool call
    #[serde(with = "duration_format")]
    pub request: Duration,
    /// Upper bound for the whole shutdown sequence
    #[serde(with = "duration_format")]
    pub shutdown: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            shutdown: Duration::from_secs(30),
        }
    }
}

/// Monitoring HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Starts the monitoring server
    pub enabled: bool,
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 26843,
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the
    /// process environment, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reads a YAML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            context: format!("reading config file {}", path.display()),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses YAML on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML for this schema.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::ConfigError {
            message: format!("invalid YAML: {e}"),
        })
    }

    /// Applies `ZEPHYR_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|key| std::env::var(key).ok());
    }

    /// Applies `ZEPHYR_*` overrides from an arbitrary lookup.
    ///
    /// Port overrides that are not positive integers are ignored.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(val) = non_empty("ZEPHYR_SERVER_DEBUG") {
            self.server.debug = val.eq_ignore_ascii_case("true");
        }
        if let Some(val) = non_empty("ZEPHYR_TRANSPORT_PROTOCOL") {
            self.transport.protocol = val;
        }
        if let Some(port) = non_empty("ZEPHYR_TRANSPORT_SSE_PORT").and_then(|v| parse_port(&v)) {
            self.transport.sse.port = port;
        }
        if let Some(port) = non_empty("ZEPHYR_TRANSPORT_HTTP_PORT").and_then(|v| parse_port(&v)) {
            self.transport.http.port = port;
        }
        if let Some(val) = non_empty("ZEPHYR_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Checks the configuration for values the server cannot run with.
    ///
    /// All problems are reported together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] listing every invalid value.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if !SUPPORTED_PROTOCOLS.contains(&self.transport.protocol.as_str()) {
            problems.push(format!(
                "invalid transport protocol: {} (must be one of: {})",
                self.transport.protocol,
                SUPPORTED_PROTOCOLS.join(", ")
            ));
        }
        if self.transport.sse.port == 0 {
            problems.push("invalid SSE port: 0 (must be 1-65535)".to_string());
        }
        if self.transport.http.port == 0 {
            problems.push("invalid HTTP port: 0 (must be 1-65535)".to_string());
        }
        if self.monitoring.enabled && self.monitoring.port == 0 {
            problems.push("invalid monitoring port: 0 (must be 1-65535)".to_string());
        }
        if self.transport.stdio.buffer_size == 0 {
            problems.push("stdio buffer size must be positive".to_string());
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            problems.push(format!(
                "invalid log level: {} (must be one of: {})",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            problems.push(format!(
                "invalid log format: {} (must be one of: {})",
                self.logging.format,
                LOG_FORMATS.join(", ")
            ));
        }
        if self.transport.http.timeout.is_zero() {
            problems.push("HTTP timeout must be positive".to_string());
        }
        if self.security.timeout.request.is_zero() {
            problems.push("request timeout must be positive".to_string());
        }
        if self.security.timeout.shutdown.is_zero() {
            problems.push("shutdown timeout must be positive".to_string());
        }
        if self.plugins.discovery.enabled && self.plugins.discovery.scan_interval.is_zero() {
            problems.push("scan interval must be positive when discovery is enabled".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigError {
                message: problems.join("; "),
            })
        }
    }

    /// Projects the selected protocol into a protocol name plus option bag.
    #[must_use]
    pub fn transport_options(&self) -> (String, JsonObject) {
        let mut options = JsonObject::new();
        match self.transport.protocol.as_str() {
            "sse" => {
                options.insert("host".into(), self.transport.sse.host.clone().into());
                options.insert("port".into(), self.transport.sse.port.into());
                options.insert("cors".into(), self.transport.sse.cors_enabled.into());
            }
            "http" => {
                options.insert("host".into(), self.transport.http.host.clone().into());
                options.insert("port".into(), self.transport.http.port.into());
                options.insert(
                    "timeout".into(),
                    humantime::format_duration(self.transport.http.timeout)
                        .to_string()
                        .into(),
                );
            }
            _ => {
                options.insert(
                    "buffer_size".into(),
                    self.transport.stdio.buffer_size.into(),
                );
            }
        }
        (self.transport.protocol.clone(), options)
    }

    /// Names of tools explicitly disabled in `plugins.tools`.
    #[must_use]
    pub fn disabled_tools(&self) -> Vec<String> {
        self.plugins
            .tools
            .iter()
            .filter(|(_, tool)| !tool.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Effective log level, taking `server.debug` into account.
    #[must_use]
    pub fn effective_log_level(&self) -> &str {
        if self.server.debug {
            "debug"
        } else {
            &self.logging.level
        }
    }
}

fn parse_port(value: &str) -> Option<u16> {
    value.parse::<u16>().ok().filter(|port| *port > 0)
}

/// Serde adapter for humantime durations ("30s", "1m 30s"); bare integers
/// are read as seconds.
mod duration_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom),
        }
    }
}
