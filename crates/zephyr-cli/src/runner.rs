//! Command execution and runtime logic.
//!
//! Contains logging initialization and the command dispatch.

use anyhow::Result;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use zephyr_core::Config;
use zephyr_core::cli::{ExitCode, OutputFormat};

use crate::cli::{Cli, Commands};
use crate::commands;

/// Builds the log filter.
///
/// `--log-level` wins, then `RUST_LOG`, then the configured level
/// (`debug` when `server.debug` is set).
#[must_use]
pub fn log_filter(cli_level: Option<&str>, config: &Config) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.effective_log_level()))
}

/// Initializes logging to stderr.
///
/// stdout stays free for the stdio transport. The layer emits JSON when
/// `logging.format` is `json`, human-readable text otherwise.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(cli_level: Option<&str>, config: &Config) -> Result<()> {
    let registry = tracing_subscriber::registry().with(log_filter(cli_level, config));
    if config.logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

/// Executes the parsed command line.
///
/// `loaded` is the outcome of loading configuration; every command except
/// `config validate` and `version` needs it to have succeeded.
///
/// # Errors
///
/// Returns an error if a command fails in a way that has no exit code of
/// its own, such as output formatting.
pub async fn execute_command(
    cli: Cli,
    loaded: zephyr_core::Result<Config>,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    match cli.command {
        Commands::Version { short } => commands::version::run(short, output_format),
        Commands::Config { action } => {
            commands::config::run(action, cli.config.as_deref(), loaded, output_format)
        }
        Commands::Serve {
            transport,
            host,
            port,
            no_monitoring,
        } => {
            let Some(config) = usable(loaded) else {
                return Ok(ExitCode::INVALID_INPUT);
            };
            let overrides = commands::serve::ServeOverrides {
                transport,
                host,
                port,
                no_monitoring,
            };
            commands::serve::run(config, &overrides).await
        }
        Commands::Plugins { action } => {
            let Some(config) = usable(loaded) else {
                return Ok(ExitCode::INVALID_INPUT);
            };
            commands::plugins::run(action, &config, output_format).await
        }
    }
}

fn usable(loaded: zephyr_core::Result<Config>) -> Option<Config> {
    match loaded {
        Ok(config) => Some(config),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            eprintln!("Error: {e}");
            None
        }
    }
}
