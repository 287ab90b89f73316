//! Serve command implementation.
//!
//! Applies the command-line overrides to the loaded configuration and runs
//! the server until a shutdown signal.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use zephyr_core::Config;
use zephyr_core::cli::ExitCode;
use zephyr_plugin::PluginLoader;
use zephyr_server::App;

/// Command-line overrides for `zephyr serve`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeOverrides {
    /// Replaces `transport.protocol`
    pub transport: Option<String>,
    /// Replaces the bind host of the selected network transport
    pub host: Option<String>,
    /// Replaces the bind port of the selected network transport
    pub port: Option<u16>,
    /// Turns the monitoring surface off
    pub no_monitoring: bool,
}

impl ServeOverrides {
    /// Applies the overrides to `config`.
    ///
    /// Host and port apply to whichever transport is selected after the
    /// protocol override; stdio ignores them.
    pub fn apply(&self, config: &mut Config) {
        if let Some(protocol) = &self.transport {
            config.transport.protocol.clone_from(protocol);
        }

        let endpoint = match config.transport.protocol.as_str() {
            "sse" => Some((&mut config.transport.sse.host, &mut config.transport.sse.port)),
            "http" => Some((&mut config.transport.http.host, &mut config.transport.http.port)),
            _ => None,
        };
        match endpoint {
            Some((host, port)) => {
                if let Some(h) = &self.host {
                    host.clone_from(h);
                }
                if let Some(p) = self.port {
                    *port = p;
                }
            }
            None if self.host.is_some() || self.port.is_some() => {
                warn!(
                    protocol = %config.transport.protocol,
                    "--host and --port only apply to the sse and http transports"
                );
            }
            None => {}
        }

        if self.no_monitoring {
            config.monitoring.enabled = false;
        }
    }
}

/// Runs the server.
///
/// Exits with [`ExitCode::INVALID_INPUT`] if the overridden configuration
/// is invalid and [`ExitCode::SERVER_ERROR`] if the server fails to start
/// or stop cleanly.
///
/// # Errors
///
/// Never fails outright; failures map to exit codes.
pub async fn run(mut config: Config, overrides: &ServeOverrides) -> Result<ExitCode> {
    overrides.apply(&mut config);
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        eprintln!("Error: {e}");
        return Ok(ExitCode::INVALID_INPUT);
    }

    let loader: Arc<dyn PluginLoader> = Arc::new(zephyr_tools::builtin_loader(&config.plugins.tools));
    let app = match App::new(config, loader) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to build server");
            return Ok(ExitCode::SERVER_ERROR);
        }
    };

    match app.run().await {
        Ok(()) => {
            info!("server stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "server failed");
            Ok(ExitCode::SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_target_selected_transport() {
        let mut config = Config::default();
        ServeOverrides {
            transport: Some("http".to_string()),
            host: Some("0.0.0.0".to_string()),
            port: Some(9000),
            no_monitoring: true,
        }
        .apply(&mut config);

        assert_eq!(config.transport.protocol, "http");
        assert_eq!(config.transport.http.host, "0.0.0.0");
        assert_eq!(config.transport.http.port, 9000);
        assert_eq!(config.transport.sse.port, Config::default().transport.sse.port);
        assert!(!config.monitoring.enabled);
    }

    #[test]
    fn test_stdio_ignores_endpoint_overrides() {
        let mut config = Config::default();
        let before = config.clone();
        ServeOverrides {
            port: Some(1234),
            ..ServeOverrides::default()
        }
        .apply(&mut config);
        assert_eq!(config, before);
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let overrides = ServeOverrides {
            transport: Some("smoke-signals".to_string()),
            ..ServeOverrides::default()
        };
        let code = run(Config::default(), &overrides).await.unwrap();
        assert_eq!(code, ExitCode::INVALID_INPUT);
    }
}
