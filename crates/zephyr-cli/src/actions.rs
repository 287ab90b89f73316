//! Subcommand actions for nested CLI commands.

use clap::Subcommand;
use std::path::PathBuf;

/// Actions of `zephyr config`.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Check the effective configuration and report every problem.
    Validate,

    /// Print the effective configuration.
    Show,
}

/// Actions of `zephyr plugins`.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PluginsAction {
    /// Discover plugins without loading them and print their status.
    List {
        /// Plugin base directory; repeat for several (default: from config)
        #[arg(long = "dir", num_args = 1)]
        dirs: Vec<PathBuf>,
    },
}
