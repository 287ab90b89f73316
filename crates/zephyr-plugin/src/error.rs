//! Error types for plugin discovery and lifecycle operations.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Stage of the plugin lifecycle an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadPhase {
    /// Scanning plugin directories
    Discover,
    /// Reading or validating a manifest
    Parse,
    /// Opening the entry point
    Open,
    /// Resolving the exported capability
    Lookup,
    /// Running the capability's initialize hook
    Init,
    /// Adding the capability to the tool registry
    Register,
    /// Running the capability's shutdown hook
    Shutdown,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Discover => "discover",
            Self::Parse => "parse",
            Self::Open => "open",
            Self::Lookup => "lookup",
            Self::Init => "init",
            Self::Register => "register",
            Self::Shutdown => "shutdown",
        };
        f.write_str(phase)
    }
}

/// Errors raised while discovering, loading or unloading plugins.
#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    /// A plugin base directory could not be created or listed.
    #[error("Failed to scan plugin directory {}: {source}", directory.display())]
    Discover {
        /// Directory being scanned
        directory: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// `plugin.json` is unreadable or fails validation.
    #[error("Invalid manifest {}: {reason}", path.display())]
    InvalidManifest {
        /// Manifest path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// No discovered plugin has this name.
    #[error("Plugin not discovered: {name}")]
    NotDiscovered {
        /// Requested name
        name: String,
    },

    /// The plugin is already loaded; the live instance was left untouched.
    #[error("Plugin already loaded: {name}")]
    AlreadyLoaded {
        /// Requested name
        name: String,
    },

    /// The plugin is not loaded.
    #[error("Plugin not loaded: {name}")]
    NotLoaded {
        /// Requested name
        name: String,
    },

    /// The loader could not open an entry point.
    #[error("Cannot open {}: {reason}", entry.display())]
    Open {
        /// Entry point path
        entry: PathBuf,
        /// Why opening failed
        reason: String,
    },

    /// The opened module does not export the requested symbol.
    #[error("Symbol not found: {symbol}")]
    SymbolNotFound {
        /// Requested symbol
        symbol: String,
    },

    /// The exported symbol is not a plugin capability.
    #[error("Symbol {symbol} has type {type_name}, expected a plugin capability")]
    TypeMismatch {
        /// Requested symbol
        symbol: String,
        /// Type reported by the module
        type_name: String,
    },

    /// The capability reports a different name than its manifest.
    #[error("Capability is named '{actual}' but the manifest declares '{expected}'")]
    NameMismatch {
        /// Name from the manifest
        expected: String,
        /// Name reported by the capability
        actual: String,
    },

    /// A sidecar process broke the wire protocol or went away.
    #[error("Sidecar protocol error: {message}")]
    Protocol {
        /// Description of the failure
        message: String,
    },

    /// A loader-level failure attributed to a plugin and phase.
    #[error("Plugin '{name}' failed during {phase}: {source}")]
    Load {
        /// Plugin name
        name: String,
        /// Phase that failed
        phase: LoadPhase,
        /// Loader error
        #[source]
        source: Box<Self>,
    },

    /// The capability's initialize hook failed; nothing was registered.
    #[error("Plugin '{name}' failed to initialize: {source}")]
    Init {
        /// Plugin name
        name: String,
        /// Hook error
        #[source]
        source: zephyr_core::Error,
    },

    /// The registry rejected the capability; it has been shut down.
    #[error("Plugin '{name}' could not be registered: {source}")]
    Register {
        /// Plugin name
        name: String,
        /// Registry error
        #[source]
        source: zephyr_core::Error,
    },

    /// The capability's shutdown hook failed.
    #[error("Plugin '{name}' failed to shut down: {source}")]
    Shutdown {
        /// Plugin name
        name: String,
        /// Hook error
        #[source]
        source: zephyr_core::Error,
    },

    /// Several plugins failed in one bulk operation.
    #[error("{} plugin(s) failed: {}", failures.len(), summarize(failures))]
    Batch {
        /// Failures keyed by plugin name
        failures: Vec<(String, Self)>,
    },
}

fn summarize(failures: &[(String, PluginError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PluginError {
    /// Lifecycle phase this error belongs to.
    ///
    /// State errors such as [`PluginError::NotLoaded`] and batch errors have
    /// no single phase.
    #[must_use]
    pub const fn phase(&self) -> Option<LoadPhase> {
        match self {
            Self::Discover { .. } => Some(LoadPhase::Discover),
            Self::InvalidManifest { .. } => Some(LoadPhase::Parse),
            Self::Open { .. } => Some(LoadPhase::Open),
            Self::SymbolNotFound { .. } | Self::TypeMismatch { .. } | Self::NameMismatch { .. } => {
                Some(LoadPhase::Lookup)
            }
            Self::Load { phase, .. } => Some(*phase),
            Self::Init { .. } => Some(LoadPhase::Init),
            Self::Register { .. } => Some(LoadPhase::Register),
            Self::Shutdown { .. } => Some(LoadPhase::Shutdown),
            Self::NotDiscovered { .. }
            | Self::AlreadyLoaded { .. }
            | Self::NotLoaded { .. }
            | Self::Protocol { .. }
            | Self::Batch { .. } => None,
        }
    }

    /// Name of the plugin this error is about, when known.
    #[must_use]
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            Self::NotDiscovered { name }
            | Self::AlreadyLoaded { name }
            | Self::NotLoaded { name }
            | Self::Load { name, .. }
            | Self::Init { name, .. }
            | Self::Register { name, .. }
            | Self::Shutdown { name, .. } => Some(name),
            Self::NameMismatch { expected, .. } => Some(expected),
            _ => None,
        }
    }

    /// Returns `true` for [`PluginError::AlreadyLoaded`].
    #[must_use]
    pub const fn is_already_loaded(&self) -> bool {
        matches!(self, Self::AlreadyLoaded { .. })
    }

    /// Returns `true` for [`PluginError::NotLoaded`].
    #[must_use]
    pub const fn is_not_loaded(&self) -> bool {
        matches!(self, Self::NotLoaded { .. })
    }

    /// Attributes a loader error to `name` and `phase`.
    pub(crate) fn in_phase(self, name: &str, phase: LoadPhase) -> Self {
        Self::Load {
            name: name.to_string(),
            phase,
            source: Box::new(self),
        }
    }
}
