//! Plugin discovery, loading and unloading.
//!
//! The manager owns the plugin state machine: a name is *discovered* when a
//! scan finds its manifest, *loaded* once its capability is initialized and
//! registered as a tool, and back to discovered after an unload. Every
//! mutation holds the state write lock for its whole duration, so a reload
//! is never interleaved with another load or unload.

use crate::capability::{PLUGIN_SYMBOL, PluginToolAdapter};
use crate::error::{LoadPhase, PluginError, Result};
use crate::loader::PluginLoader;
use crate::manifest::{MANIFEST_FILE, PluginManifest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zephyr_core::traits::McpTool;
use zephyr_registry::{ToolDiscovery, ToolRegistry};

#[derive(Debug, Clone)]
struct DiscoveredPlugin {
    manifest: PluginManifest,
    directory: PathBuf,
}

struct LoadedPlugin {
    manifest: PluginManifest,
    adapter: Arc<PluginToolAdapter>,
    loaded_at: DateTime<Utc>,
    enabled: bool,
    directory: PathBuf,
}

#[derive(Default)]
struct ManagerState {
    discovered: BTreeMap<String, DiscoveredPlugin>,
    loaded: HashMap<String, LoadedPlugin>,
    last_errors: HashMap<String, String>,
}

/// Snapshot of one plugin's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginStatus {
    /// Plugin name
    pub name: String,
    /// Version from the manifest
    pub version: String,
    /// Description from the manifest
    pub description: String,
    /// Directory holding the manifest
    pub directory: PathBuf,
    /// Found by the latest scan
    pub discovered: bool,
    /// Currently loaded and registered
    pub loaded: bool,
    /// Not disabled by configuration
    pub enabled: bool,
    /// When the current instance was loaded
    pub loaded_at: Option<DateTime<Utc>>,
    /// Most recent load or unload failure
    pub last_error: Option<String>,
}

/// Outcome of [`PluginManager::load_all_plugins`] when nothing failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Plugins loaded by this call
    pub loaded: Vec<String>,
    /// Plugins skipped because configuration disables them
    pub skipped: Vec<String>,
}

/// Discovers plugins on disk and manages their lifecycle.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use zephyr_plugin::{PluginManager, ProcessLoader};
/// use zephyr_registry::ToolRegistry;
///
/// # async fn run() -> zephyr_plugin::Result<()> {
/// let registry = Arc::new(ToolRegistry::new());
/// let manager = PluginManager::new(
///     vec!["./plugins".into()],
///     Arc::clone(&registry),
///     Arc::new(ProcessLoader::new()),
/// );
///
/// manager.discover_plugins().await?;
/// let summary = manager.load_all_plugins().await?;
/// println!("loaded {:?}", summary.loaded);
/// # Ok(())
/// # }
/// ```
pub struct PluginManager {
    directories: Vec<PathBuf>,
    registry: Arc<ToolRegistry>,
    loader: Arc<dyn PluginLoader>,
    disabled: HashSet<String>,
    state: RwLock<ManagerState>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("directories", &self.directories)
            .field("loader", &self.loader)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    /// Creates a manager scanning `directories` in order.
    #[must_use]
    pub fn new(
        directories: Vec<PathBuf>,
        registry: Arc<ToolRegistry>,
        loader: Arc<dyn PluginLoader>,
    ) -> Self {
        Self {
            directories,
            registry,
            loader,
            disabled: HashSet::new(),
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Excludes `names` from bulk loads and rescans.
    #[must_use]
    pub fn with_disabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(names.into_iter().map(Into::into));
        self
    }

    /// Base directories, in scan order.
    #[must_use]
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Registry plugins are registered into.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Scans every base directory and replaces the discovered set.
    ///
    /// Base directories are created when missing. A manifest that fails to
    /// parse is logged and skipped. When two manifests share a name, the
    /// one found first wins: earlier base directory, then the
    /// lexicographically smaller subdirectory.
    ///
    /// Returns the names that were not discovered before this scan.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Discover`] if a base directory cannot be
    /// created or listed.
    pub async fn discover_plugins(&self) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let found = scan(&self.directories).await?;

        let added: Vec<String> = found
            .keys()
            .filter(|name| !state.discovered.contains_key(*name))
            .cloned()
            .collect();
        info!(
            discovered = found.len(),
            new = added.len(),
            "plugin discovery finished"
        );
        state.discovered = found;
        Ok(added)
    }

    /// Loads a discovered plugin and registers it as a tool.
    ///
    /// # Errors
    ///
    /// - [`PluginError::NotDiscovered`] for unknown names
    /// - [`PluginError::AlreadyLoaded`] if the name is loaded; the live
    ///   instance is untouched
    /// - an error carrying the failed [`LoadPhase`] otherwise
    pub async fn load_plugin(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        self.load_locked(&mut state, name).await
    }

    /// Deregisters a loaded plugin and runs its shutdown hook.
    ///
    /// The plugin is forgotten even if its shutdown fails.
    ///
    /// # Errors
    ///
    /// - [`PluginError::NotLoaded`] if the name is not loaded
    /// - [`PluginError::Shutdown`] if the shutdown hook failed
    pub async fn unload_plugin(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        self.unload_locked(&mut state, name).await
    }

    /// Unloads the plugin if loaded, then loads it again.
    ///
    /// # Errors
    ///
    /// Returns the unload error, which aborts the reload, or the load error.
    pub async fn reload_plugin(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.loaded.contains_key(name) {
            self.unload_locked(&mut state, name).await?;
        }
        self.load_locked(&mut state, name).await
    }

    /// Status of every discovered or loaded plugin, sorted by name.
    pub async fn list_plugins(&self) -> Vec<PluginStatus> {
        let state = self.state.read().await;
        let names: BTreeSet<&String> = state
            .discovered
            .keys()
            .chain(state.loaded.keys())
            .collect();
        names
            .into_iter()
            .filter_map(|name| self.status(&state, name))
            .collect()
    }

    /// Status of one plugin.
    pub async fn get_plugin(&self, name: &str) -> Option<PluginStatus> {
        let state = self.state.read().await;
        self.status(&state, name)
    }

    /// Names of loaded plugins, sorted.
    pub async fn loaded_plugins(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.loaded.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` is loaded.
    pub async fn is_loaded(&self, name: &str) -> bool {
        self.state.read().await.loaded.contains_key(name)
    }

    /// Loads every discovered plugin that is neither loaded nor disabled.
    ///
    /// Successful loads are kept even when others fail.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Batch`] listing each failed plugin.
    pub async fn load_all_plugins(&self) -> Result<LoadSummary> {
        let mut state = self.state.write().await;
        let candidates: Vec<String> = state
            .discovered
            .keys()
            .filter(|name| !state.loaded.contains_key(*name))
            .cloned()
            .collect();
        let (summary, failures) = self.load_many(&mut state, candidates).await;
        batch(failures).map(|()| summary)
    }

    /// Unloads every loaded plugin, continuing past failures.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Batch`] listing each failed plugin.
    pub async fn unload_all_plugins(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let mut names: Vec<String> = state.loaded.keys().cloned().collect();
        names.sort();

        let mut failures = Vec::new();
        for name in names {
            if let Err(e) = self.unload_locked(&mut state, &name).await {
                failures.push((name, e));
            }
        }
        batch(failures)
    }

    /// Rescans the plugin directories and loads newly discovered plugins.
    ///
    /// Individual load failures are logged and recorded in the plugin's
    /// status rather than returned.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Discover`] if scanning fails.
    pub async fn rescan(&self) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let found = scan(&self.directories).await?;
        let added: Vec<String> = found
            .keys()
            .filter(|name| !state.discovered.contains_key(*name))
            .cloned()
            .collect();
        state.discovered = found;

        let added: Vec<String> = added
            .into_iter()
            .filter(|name| !state.loaded.contains_key(name))
            .collect();
        if added.is_empty() {
            debug!("rescan found no new plugins");
            return Ok(Vec::new());
        }

        let (summary, failures) = self.load_many(&mut state, added).await;
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                "some newly discovered plugins failed to load"
            );
        }
        Ok(summary.loaded)
    }

    async fn load_many(
        &self,
        state: &mut ManagerState,
        names: Vec<String>,
    ) -> (LoadSummary, Vec<(String, PluginError)>) {
        let mut summary = LoadSummary::default();
        let mut failures = Vec::new();
        for name in names {
            if self.disabled.contains(&name) {
                info!(plugin = %name, "plugin disabled by configuration; skipping");
                summary.skipped.push(name);
                continue;
            }
            match self.load_locked(state, &name).await {
                Ok(()) => summary.loaded.push(name),
                Err(e) => failures.push((name, e)),
            }
        }
        (summary, failures)
    }

    async fn load_locked(&self, state: &mut ManagerState, name: &str) -> Result<()> {
        if state.loaded.contains_key(name) {
            return Err(PluginError::AlreadyLoaded {
                name: name.to_string(),
            });
        }
        let Some(found) = state.discovered.get(name).cloned() else {
            return Err(PluginError::NotDiscovered {
                name: name.to_string(),
            });
        };

        match self.activate(&found).await {
            Ok(adapter) => {
                info!(
                    plugin = %name,
                    version = %found.manifest.version,
                    "plugin loaded"
                );
                state.last_errors.remove(name);
                state.loaded.insert(
                    name.to_string(),
                    LoadedPlugin {
                        manifest: found.manifest,
                        adapter,
                        loaded_at: Utc::now(),
                        enabled: true,
                        directory: found.directory,
                    },
                );
                Ok(())
            }
            Err(e) => {
                warn!(plugin = %name, phase = ?e.phase(), error = %e, "failed to load plugin");
                state.last_errors.insert(name.to_string(), e.to_string());
                Err(e)
            }
        }
    }

    /// Runs the open, lookup, init and register phases for one plugin.
    async fn activate(&self, found: &DiscoveredPlugin) -> Result<Arc<PluginToolAdapter>> {
        let name = found.manifest.name.as_str();

        let entry = found
            .manifest
            .entry_path(&found.directory)
            .map_err(|e| e.in_phase(name, LoadPhase::Open))?;
        if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
            return Err(PluginError::Open {
                entry,
                reason: "entry point does not exist".to_string(),
            }
            .in_phase(name, LoadPhase::Open));
        }

        let module = self
            .loader
            .open(&entry)
            .await
            .map_err(|e| e.in_phase(name, LoadPhase::Open))?;
        let plugin = module
            .lookup(PLUGIN_SYMBOL)
            .await
            .and_then(|export| export.into_plugin(PLUGIN_SYMBOL))
            .map_err(|e| e.in_phase(name, LoadPhase::Lookup))?;
        if plugin.name() != name {
            return Err(PluginError::NameMismatch {
                expected: name.to_string(),
                actual: plugin.name().to_string(),
            });
        }

        plugin
            .initialize()
            .await
            .map_err(|source| PluginError::Init {
                name: name.to_string(),
                source,
            })?;

        let adapter = Arc::new(PluginToolAdapter::new(plugin));
        let tool: Arc<dyn McpTool> = adapter.clone();
        if let Err(source) = self.registry.register(tool).await {
            if let Err(e) = adapter.shutdown().await {
                warn!(plugin = %name, error = %e, "shutdown after failed registration also failed");
            }
            return Err(PluginError::Register {
                name: name.to_string(),
                source,
            });
        }
        Ok(adapter)
    }

    async fn unload_locked(&self, state: &mut ManagerState, name: &str) -> Result<()> {
        let Some(plugin) = state.loaded.remove(name) else {
            return Err(PluginError::NotLoaded {
                name: name.to_string(),
            });
        };

        // Registry cleanup runs the shutdown hook; the adapter replays its
        // outcome below.
        if let Err(e) = self.registry.unregister(name).await {
            warn!(plugin = %name, error = %e, "failed to unregister plugin tool");
        }

        match plugin.adapter.shutdown().await {
            Ok(()) => {
                state.last_errors.remove(name);
                info!(plugin = %name, "plugin unloaded");
                Ok(())
            }
            Err(source) => {
                warn!(plugin = %name, error = %source, "plugin shutdown failed");
                let err = PluginError::Shutdown {
                    name: name.to_string(),
                    source,
                };
                state.last_errors.insert(name.to_string(), err.to_string());
                Err(err)
            }
        }
    }

    fn status(&self, state: &ManagerState, name: &str) -> Option<PluginStatus> {
        let discovered = state.discovered.get(name);
        let loaded = state.loaded.get(name);
        let (manifest, directory) = match (loaded, discovered) {
            (Some(p), _) => (&p.manifest, &p.directory),
            (None, Some(d)) => (&d.manifest, &d.directory),
            (None, None) => return None,
        };

        Some(PluginStatus {
            name: name.to_string(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            directory: directory.clone(),
            discovered: discovered.is_some(),
            loaded: loaded.is_some(),
            enabled: loaded.map_or_else(|| !self.disabled.contains(name), |p| p.enabled),
            loaded_at: loaded.map(|p| p.loaded_at),
            last_error: state.last_errors.get(name).cloned(),
        })
    }
}

#[async_trait]
impl ToolDiscovery for PluginManager {
    async fn discover(&self) -> zephyr_core::Result<()> {
        let loaded = self
            .rescan()
            .await
            .map_err(|e| zephyr_core::Error::execution("plugin-discovery", e.to_string()))?;
        if !loaded.is_empty() {
            info!(plugins = ?loaded, "rescan loaded plugins");
        }
        Ok(())
    }
}

fn batch(failures: Vec<(String, PluginError)>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(PluginError::Batch { failures })
    }
}

/// Reads every manifest under `directories`, first occurrence of a name wins.
async fn scan(directories: &[PathBuf]) -> Result<BTreeMap<String, DiscoveredPlugin>> {
    let mut found: BTreeMap<String, DiscoveredPlugin> = BTreeMap::new();
    for base in directories {
        for directory in subdirectories(base).await? {
            let manifest_path = directory.join(MANIFEST_FILE);
            if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
                debug!(directory = %directory.display(), "no manifest; skipping");
                continue;
            }

            let manifest = match PluginManifest::load(&manifest_path).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(error = %e, "skipping plugin with invalid manifest");
                    continue;
                }
            };

            if let Some(existing) = found.get(&manifest.name) {
                warn!(
                    plugin = %manifest.name,
                    kept = %existing.directory.display(),
                    skipped = %directory.display(),
                    "duplicate plugin name; keeping the first"
                );
                continue;
            }
            found.insert(
                manifest.name.clone(),
                DiscoveredPlugin {
                    manifest,
                    directory,
                },
            );
        }
    }
    Ok(found)
}

/// Immediate subdirectories of `base`, sorted by file name.
async fn subdirectories(base: &Path) -> Result<Vec<PathBuf>> {
    let discover_error = |source: std::io::Error| PluginError::Discover {
        directory: base.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(base).await.map_err(discover_error)?;
    let mut entries = tokio::fs::read_dir(base).await.map_err(discover_error)?;

    let mut directories = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discover_error)? {
        match entry.file_type().await {
            Ok(kind) if kind.is_dir() => directories.push(entry.path()),
            Ok(_) => {}
            Err(e) => debug!(path = %entry.path().display(), error = %e, "cannot stat entry"),
        }
    }
    directories.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(directories)
}
