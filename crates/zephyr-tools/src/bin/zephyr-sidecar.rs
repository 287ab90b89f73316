//! Serves one builtin tool as a sidecar plugin over stdin and stdout.
//!
//! Point a plugin manifest's `entry_point` at a wrapper that execs
//! `zephyr-sidecar <tool>` to run a builtin in its own process.
//!
//! ```bash
//! zephyr-sidecar currenttime --timezone +01:00
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use zephyr_core::JsonObject;

/// Serve a Zephyr builtin tool over the sidecar protocol.
#[derive(Parser, Debug)]
#[command(name = "zephyr-sidecar")]
#[command(version, about, long_about = None)]
struct Args {
    /// Builtin tool to serve (currenttime, fileops, systeminfo)
    tool: String,

    /// Default timezone for currenttime
    #[arg(long, env = "ZEPHYR_SIDECAR_TIMEZONE")]
    timezone: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut settings = JsonObject::new();
    if let Some(zone) = &args.timezone {
        settings.insert("timezone".to_string(), json!(zone));
    }

    let plugin = zephyr_tools::builtin_with_settings(&args.tool, &settings).ok_or_else(|| {
        anyhow!(
            "unknown tool '{}' (available: {})",
            args.tool,
            zephyr_tools::BUILTIN_TOOLS.join(", ")
        )
    })?;

    tracing::info!(tool = %args.tool, "serving sidecar");
    zephyr_plugin::sidecar::serve_stdio(plugin).await?;
    Ok(())
}
