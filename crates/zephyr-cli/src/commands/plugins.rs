//! Plugins command implementation.
//!
//! Scans plugin directories the same way the server does at startup, but
//! loads nothing.

use crate::actions::PluginsAction;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use zephyr_core::Config;
use zephyr_core::cli::{ExitCode, OutputFormat};
use zephyr_plugin::{PluginLoader, PluginManager, PluginStatus};
use zephyr_registry::ToolRegistry;

/// Result of `zephyr plugins list`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PluginList {
    /// Directories scanned, in order
    pub directories: Vec<PathBuf>,
    /// Number of plugins found
    pub count: usize,
    /// Status of each plugin, sorted by name
    pub plugins: Vec<PluginStatus>,
}

/// Runs a plugins action.
///
/// # Errors
///
/// Returns an error if a plugin directory cannot be created or read.
pub async fn run(
    action: PluginsAction,
    config: &Config,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    match action {
        PluginsAction::List { dirs } => {
            let list = list_plugins(config, dirs).await?;
            println!("{}", crate::formatters::format_output(&list, output_format)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Discovers plugins in `dirs`, or in the configured directories when
/// `dirs` is empty.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or read.
pub async fn list_plugins(config: &Config, dirs: Vec<PathBuf>) -> Result<PluginList> {
    let directories = if dirs.is_empty() {
        config.plugins.discovery.directories.clone()
    } else {
        dirs
    };
    info!(directories = ?directories, "scanning plugin directories");

    let loader: Arc<dyn PluginLoader> = Arc::new(zephyr_tools::builtin_loader(&config.plugins.tools));
    let manager = PluginManager::new(directories.clone(), Arc::new(ToolRegistry::new()), loader)
        .with_disabled(config.disabled_tools());
    manager
        .discover_plugins()
        .await
        .context("failed to scan plugin directories")?;

    let plugins = manager.list_plugins().await;
    if plugins.is_empty() {
        warn!("no plugins found");
    }
    Ok(PluginList {
        directories,
        count: plugins.len(),
        plugins,
    })
}
