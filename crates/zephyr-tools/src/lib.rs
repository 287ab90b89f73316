//! Builtin tools shipped with the Zephyr MCP server.
//!
//! Three tools are compiled in:
//!
//! - [`CurrentTime`] reports the current time in a chosen zone and format
//! - [`SystemInfo`] reports host and process details
//! - [`FileOps`] reads, writes and inspects files
//!
//! Each implements [`DynamicPlugin`]. A plugin directory opts into a builtin
//! by naming `<tool>.builtin` as its manifest entry point; [`builtin_loader`]
//! maps those entry points to the compiled-in tools and sends every other
//! entry point to a [`ProcessLoader`]. The `zephyr-sidecar` binary serves
//! the same tools out of process.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! let loader = zephyr_tools::builtin_loader(&BTreeMap::new());
//! assert_eq!(
//!     loader.entries(),
//!     vec!["currenttime.builtin", "fileops.builtin", "systeminfo.builtin"]
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod args;
mod currenttime;
mod fileops;
mod systeminfo;

pub use currenttime::{CurrentTime, Zone};
pub use fileops::{FileOps, MAX_FILE_SIZE, OPERATIONS};
pub use systeminfo::SystemInfo;

use std::collections::BTreeMap;
use std::sync::Arc;
use zephyr_core::JsonObject;
use zephyr_core::config::ToolConfig;
use zephyr_plugin::{BuiltinLoader, DynamicPlugin, Export, ProcessLoader};

/// Names of the compiled-in tools, sorted.
pub const BUILTIN_TOOLS: &[&str] = &[CurrentTime::NAME, FileOps::NAME, SystemInfo::NAME];

/// Suffix of the entry-point marker file that selects a builtin.
pub const ENTRY_SUFFIX: &str = ".builtin";

/// Entry-point file name that selects the builtin `name`.
#[must_use]
pub fn entry_point(name: &str) -> String {
    format!("{name}{ENTRY_SUFFIX}")
}

/// Instantiates the builtin `name` with default settings.
#[must_use]
pub fn builtin(name: &str) -> Option<Arc<dyn DynamicPlugin>> {
    builtin_with_settings(name, &JsonObject::new())
}

/// Instantiates the builtin `name` with tool settings from configuration.
///
/// `currenttime` reads `timezone`; the other tools take no settings.
#[must_use]
pub fn builtin_with_settings(name: &str, settings: &JsonObject) -> Option<Arc<dyn DynamicPlugin>> {
    let plugin: Arc<dyn DynamicPlugin> = match name {
        CurrentTime::NAME => {
            let zone = settings
                .get("timezone")
                .and_then(|v| v.as_str())
                .unwrap_or("UTC");
            Arc::new(CurrentTime::new(zone))
        }
        FileOps::NAME => Arc::new(FileOps::default()),
        SystemInfo::NAME => Arc::new(SystemInfo),
        _ => return None,
    };
    Some(plugin)
}

/// Loader resolving `<tool>.builtin` entry points to the compiled-in tools.
///
/// Settings for each tool come from `tools`, keyed by tool name. Every
/// load builds a fresh instance, so a reload picks up a clean tool. Other
/// entry points are run as sidecar processes.
#[must_use]
pub fn builtin_loader(tools: &BTreeMap<String, ToolConfig>) -> BuiltinLoader {
    let mut loader = BuiltinLoader::new().with_fallback(Arc::new(ProcessLoader::new()));
    for &name in BUILTIN_TOOLS {
        let settings = tools
            .get(name)
            .map(|tool| tool.settings.clone())
            .unwrap_or_default();
        loader = loader.with_entry(
            entry_point(name),
            Arc::new(move || {
                builtin_with_settings(name, &settings).map_or_else(
                    || Export::Foreign {
                        type_name: name.to_string(),
                    },
                    Export::Shared,
                )
            }),
        );
    }
    loader
}
