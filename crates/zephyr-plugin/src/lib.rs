//! Plugin support for the Zephyr MCP server.
//!
//! Plugins live in subdirectories of the configured plugin directories,
//! each described by a `plugin.json` manifest. The [`PluginManager`] scans
//! for manifests, opens entry points through a [`PluginLoader`], and
//! registers each plugin's [`DynamicPlugin`] capability as a tool.
//!
//! # Loading
//!
//! There is no in-process dynamic code loading. Entry points are resolved
//! either against capabilities compiled into the host ([`BuiltinLoader`])
//! or by running them as sidecar processes ([`ProcessLoader`]) that speak
//! the line-delimited JSON protocol in [`protocol`]. Sidecar binaries use
//! [`sidecar::serve_stdio`] to answer it.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod capability;
mod error;
mod loader;
mod manager;
mod manifest;

pub mod protocol;
pub mod sidecar;

pub use capability::{DynamicPlugin, Export, PLUGIN_SYMBOL, PluginToolAdapter};
pub use error::{LoadPhase, PluginError, Result};
pub use loader::{
    BuiltinLoader, ExportFactory, PluginLoader, PluginModule, ProcessLoader, SidecarModule,
    SidecarTimeouts,
};
pub use manager::{LoadSummary, PluginManager, PluginStatus};
pub use manifest::{MANIFEST_FILE, PluginManifest};
