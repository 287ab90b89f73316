//! Zephyr CLI library.
//!
//! Argument definitions, command implementations and output formatters
//! behind the `zephyr` binary, exposed so they can be tested.

pub mod actions;
pub mod cli;
pub mod commands;
pub mod formatters;
pub mod runner;

pub use actions::{ConfigAction, PluginsAction};
pub use cli::{Cli, Commands};
