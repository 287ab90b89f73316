//! Zephyr MCP server CLI.
//!
//! # Examples
//!
//! ```bash
//! # Serve over stdio with the default configuration
//! zephyr serve
//!
//! # Check a configuration file
//! zephyr --config zephyr.yaml config validate
//!
//! # See what the plugin directories contain
//! zephyr plugins list --dir ./plugins --format text
//! ```

use anyhow::Result;
use clap::Parser;
use zephyr_cli::Cli;
use zephyr_cli::runner::{execute_command, init_logging};
use zephyr_core::Config;
use zephyr_core::cli::OutputFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output_format: OutputFormat = cli
        .format
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // A config that fails to load still gets default logging.
    let loaded = Config::load(cli.config.as_deref());
    let log_config = loaded.as_ref().map_or_else(|_| Config::default(), Clone::clone);
    init_logging(cli.log_level.as_deref(), &log_config)?;

    let exit_code = execute_command(cli, loaded, output_format).await?;
    std::process::exit(exit_code.as_i32());
}
