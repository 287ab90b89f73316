use super::{PluginLoader, PluginModule};
use crate::capability::{Export, PLUGIN_SYMBOL};
use crate::error::{PluginError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Builds a fresh export each time a module is looked up.
pub type ExportFactory = Arc<dyn Fn() -> Export + Send + Sync>;

/// Loader backed by capabilities compiled into the host.
///
/// Entries are keyed by entry-point file name. The file itself must exist
/// in the plugin directory but its contents are not read. Entry points not
/// in the table go to the fallback loader, if one is set.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use zephyr_plugin::{BuiltinLoader, Export};
///
/// let loader = BuiltinLoader::new().with_entry("inert.plugin", Arc::new(|| Export::Foreign {
///     type_name: "marker".to_string(),
/// }));
/// assert_eq!(loader.entries(), vec!["inert.plugin"]);
/// ```
#[derive(Default)]
pub struct BuiltinLoader {
    entries: BTreeMap<String, ExportFactory>,
    fallback: Option<Arc<dyn PluginLoader>>,
}

impl fmt::Debug for BuiltinLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinLoader")
            .field("entries", &self.entries())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl BuiltinLoader {
    /// Creates an empty table with no fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry for the entry-point file name `file_name`.
    #[must_use]
    pub fn with_entry(mut self, file_name: impl Into<String>, factory: ExportFactory) -> Self {
        self.entries.insert(file_name.into(), factory);
        self
    }

    /// Sends entry points missing from the table to `fallback`.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn PluginLoader>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Registered entry-point file names, sorted.
    #[must_use]
    pub fn entries(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl PluginLoader for BuiltinLoader {
    async fn open(&self, entry: &Path) -> Result<Box<dyn PluginModule>> {
        let factory = entry
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.entries.get(name));

        let Some(factory) = factory else {
            return match &self.fallback {
                Some(fallback) => fallback.open(entry).await,
                None => Err(PluginError::Open {
                    entry: entry.to_path_buf(),
                    reason: "no builtin plugin for this entry point".to_string(),
                }),
            };
        };

        if !tokio::fs::try_exists(entry).await.unwrap_or(false) {
            return Err(PluginError::Open {
                entry: entry.to_path_buf(),
                reason: "entry point does not exist".to_string(),
            });
        }

        Ok(Box::new(BuiltinModule {
            factory: Arc::clone(factory),
        }))
    }
}

struct BuiltinModule {
    factory: ExportFactory,
}

#[async_trait]
impl PluginModule for BuiltinModule {
    async fn lookup(&self, symbol: &str) -> Result<Export> {
        if symbol == PLUGIN_SYMBOL {
            Ok((self.factory)())
        } else {
            Err(PluginError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn marker_loader() -> BuiltinLoader {
        BuiltinLoader::new().with_entry(
            "marker.plugin",
            Arc::new(|| Export::Foreign {
                type_name: "marker".to_string(),
            }),
        )
    }

    #[derive(Debug)]
    struct Refusing;

    #[async_trait]
    impl PluginLoader for Refusing {
        async fn open(&self, entry: &Path) -> Result<Box<dyn PluginModule>> {
            Err(PluginError::Open {
                entry: entry.to_path_buf(),
                reason: "refused by fallback".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_open_requires_marker_file() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("marker.plugin");
        let loader = marker_loader();

        let err = loader.open(&entry).await.err().unwrap();
        assert!(err.to_string().contains("does not exist"));

        std::fs::write(&entry, b"").unwrap();
        let module = loader.open(&entry).await.unwrap();
        let export = module.lookup(PLUGIN_SYMBOL).await.unwrap();
        assert!(matches!(export, Export::Foreign { .. }));

        let err = module.lookup("Other").await.unwrap_err();
        assert!(matches!(err, PluginError::SymbolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_entry_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("unknown.bin");

        let err = marker_loader().open(&entry).await.err().unwrap();
        assert!(err.to_string().contains("no builtin plugin"));

        let loader = marker_loader().with_fallback(Arc::new(Refusing));
        let err = loader.open(&entry).await.err().unwrap();
        assert!(err.to_string().contains("refused by fallback"));
    }
}
