//! Command implementations for the `zephyr` CLI.
//!
//! Each module runs one subcommand and returns the process exit code.

pub mod config;
pub mod plugins;
pub mod serve;
pub mod version;
