//! CLI argument definitions and parsing.
//!
//! - `Cli` - Main CLI entry point
//! - `Commands` - Available subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::actions::{ConfigAction, PluginsAction};

/// Zephyr - a pluggable MCP tool server.
///
/// Serves tools loaded from plugin directories over stdio, SSE or
/// streamable HTTP.
#[derive(Parser, Debug)]
#[command(name = "zephyr")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a YAML configuration file
    #[arg(short, long, global = true, env = "ZEPHYR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (debug, info, warn, error); overrides RUST_LOG and config
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format (json, text, pretty)
    #[arg(long = "format", global = true, default_value = "pretty")]
    pub format: String,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the MCP server until interrupted.
    ///
    /// Loads plugins from the configured directories, starts the selected
    /// transport and the monitoring surface, and shuts everything down in
    /// order on ctrl-c or SIGTERM.
    ///
    /// # Examples
    ///
    /// ```bash
    /// # stdio, as launched by an MCP client
    /// zephyr serve
    ///
    /// # streamable HTTP on a chosen port, no monitoring
    /// zephyr serve --transport http --port 9000 --no-monitoring
    /// ```
    Serve {
        /// Transport protocol (stdio, sse, http)
        #[arg(short, long)]
        transport: Option<String>,

        /// Bind host for the sse and http transports
        #[arg(long)]
        host: Option<String>,

        /// Bind port for the sse and http transports
        #[arg(short, long)]
        port: Option<u16>,

        /// Disable the monitoring HTTP surface
        #[arg(long)]
        no_monitoring: bool,
    },

    /// Inspect configuration.
    Config {
        /// Config action
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect plugin directories.
    Plugins {
        /// Plugins action
        #[command(subcommand)]
        action: PluginsAction,
    },

    /// Print version information.
    Version {
        /// Print only the version number
        #[arg(long)]
        short: bool,
    },
}
