//! Plugin loading backends.
//!
//! A [`PluginLoader`] turns an entry-point path into a [`PluginModule`],
//! from which the manager looks up the exported capability. Two backends
//! are provided:
//!
//! - [`BuiltinLoader`] resolves entry points against a table of capabilities
//!   compiled into the host binary
//! - [`ProcessLoader`] runs the entry point as a child process that speaks
//!   the line-delimited protocol in [`crate::protocol`]

mod builtin;
mod process;

pub use builtin::{BuiltinLoader, ExportFactory};
pub use process::{ProcessLoader, SidecarModule, SidecarTimeouts};

use crate::capability::Export;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Opens plugin entry points.
#[async_trait]
pub trait PluginLoader: Send + Sync + fmt::Debug {
    /// Opens the entry point at `entry`.
    ///
    /// # Errors
    ///
    /// Returns an open-phase error if the entry point cannot be used.
    async fn open(&self, entry: &Path) -> Result<Box<dyn PluginModule>>;
}

/// An opened plugin entry point.
#[async_trait]
pub trait PluginModule: Send + Sync {
    /// Resolves an exported symbol.
    ///
    /// # Errors
    ///
    /// Returns a lookup-phase error if the symbol is absent.
    async fn lookup(&self, symbol: &str) -> Result<Export>;
}
