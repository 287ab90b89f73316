//! Version command implementation.

use anyhow::Result;
use serde::Serialize;
use zephyr_core::cli::{ExitCode, OutputFormat};

/// Build information reported by `zephyr version`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// Binary name
    pub name: &'static str,
    /// Crate version
    pub version: &'static str,
    /// MCP protocol revision the server speaks
    pub protocol: &'static str,
    /// Compiled-in tools
    pub builtin_tools: Vec<&'static str>,
}

impl VersionInfo {
    /// Information about this build.
    #[must_use]
    pub fn current() -> Self {
        Self {
            name: "zephyr",
            version: env!("CARGO_PKG_VERSION"),
            protocol: "2025-03-26",
            builtin_tools: zephyr_tools::BUILTIN_TOOLS.to_vec(),
        }
    }
}

/// Prints version information; `short` prints the bare version number.
///
/// # Errors
///
/// Returns an error if formatting fails.
pub fn run(short: bool, output_format: OutputFormat) -> Result<ExitCode> {
    let info = VersionInfo::current();
    if short {
        println!("{}", info.version);
    } else {
        println!("{}", crate::formatters::format_output(&info, output_format)?);
    }
    Ok(ExitCode::SUCCESS)
}
