//! MCP server core for Zephyr.
//!
//! Tools come from plugins managed by `zephyr-plugin` and live in a shared
//! `zephyr-registry`. This crate puts the protocol in front of them:
//!
//! - [`ZephyrService`] answers `tools/list` and `tools/call` from the live
//!   registry and converts tool results into protocol content
//! - [`MetricsCollector`] records latency and outcome per call
//! - [`monitoring`] exposes health, metrics and plugin control over HTTP
//! - [`App`] builds all of the above from a [`Config`](zephyr_core::Config)
//!   and runs the startup and shutdown sequence
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use zephyr_core::Config;
//! use zephyr_plugin::ProcessLoader;
//! use zephyr_server::App;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let app = App::new(config, Arc::new(ProcessLoader::new()))?;
//! app.run().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod app;
mod error;
mod metrics;
mod service;

pub mod monitoring;

pub use app::App;
pub use error::{Result, ServerError};
pub use metrics::{LATENCY_WINDOW, LatencySummary, MetricsCollector, MetricsSnapshot, ToolMetrics};
pub use service::{ServerIdentity, ZephyrService, to_content, translate_schema};
