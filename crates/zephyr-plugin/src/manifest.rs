//! Plugin manifest (`plugin.json`) parsing and validation.

use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use zephyr_core::JsonObject;

/// File name of the manifest inside each plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Metadata describing one plugin.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use zephyr_plugin::PluginManifest;
///
/// let manifest = PluginManifest::parse(
///     r#"{"name": "echo", "version": "1.0.0", "entry_point": "echo.plugin"}"#,
///     Path::new("plugins/echo/plugin.json"),
/// )
/// .unwrap();
///
/// assert_eq!(manifest.name, "echo");
/// assert_eq!(
///     manifest.entry_path(Path::new("plugins/echo")).unwrap(),
///     Path::new("plugins/echo/echo.plugin")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin name, also the registered tool name
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Entry point, relative to the plugin directory
    pub entry_point: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Plugin author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Plugin API version the plugin was built against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Names of plugins this one depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Permissions the plugin requests
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Schema of the plugin's own settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<JsonObject>,
}

impl PluginManifest {
    /// Parses and validates manifest text read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidManifest`] for malformed JSON, missing
    /// or empty required fields, or an entry point outside the plugin
    /// directory.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let manifest: Self =
            serde_json::from_str(text).map_err(|e| PluginError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        manifest
            .validate()
            .map_err(|reason| PluginError::InvalidManifest {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(manifest)
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidManifest`] if the file cannot be read
    /// or fails [`PluginManifest::parse`].
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PluginError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::parse(&text, path)
    }

    /// Checks required fields and the entry point shape.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("entry_point", &self.entry_point),
        ] {
            if value.trim().is_empty() {
                return Err(format!("'{field}' must not be empty"));
            }
        }
        check_relative(Path::new(&self.entry_point))
    }

    /// Resolves the entry point against the plugin directory.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Open`] if the entry point is absolute or
    /// climbs out of `directory`.
    pub fn entry_path(&self, directory: &Path) -> Result<PathBuf> {
        let entry = Path::new(&self.entry_point);
        check_relative(entry).map_err(|reason| PluginError::Open {
            entry: directory.join(entry),
            reason,
        })?;
        Ok(directory.join(entry))
    }
}

fn check_relative(entry: &Path) -> std::result::Result<(), String> {
    for component in entry.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err("entry_point must not contain '..'".to_string());
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err("entry_point must be a relative path".to_string());
            }
        }
    }
    Ok(())
}
