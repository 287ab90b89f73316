//! The capability a plugin exports and its adaptation into a registry tool.

use crate::error::{PluginError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use zephyr_core::traits::McpTool;
use zephyr_core::{Arguments, Error, JsonObject, ToolDescriptor, ToolOutput};

/// Symbol every plugin module exports its capability under.
pub const PLUGIN_SYMBOL: &str = "ZephyrPlugin";

/// Capability set a plugin provides.
///
/// The manager calls `initialize` once after loading and `shutdown` once
/// before the plugin is released.
#[async_trait]
pub trait DynamicPlugin: Send + Sync {
    /// Plugin and tool name.
    fn name(&self) -> &str;

    /// Plugin version.
    fn version(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Declared input schema.
    fn input_schema(&self) -> JsonObject;

    /// Descriptor exposed to protocol callers.
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.input_schema())
    }

    /// Prepares the plugin for calls.
    ///
    /// # Errors
    ///
    /// A failure aborts loading.
    async fn initialize(&self) -> zephyr_core::Result<()> {
        Ok(())
    }

    /// Runs the plugin's tool.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the call failed.
    async fn execute(
        &self,
        ct: CancellationToken,
        args: Arguments,
    ) -> zephyr_core::Result<ToolOutput>;

    /// Releases the plugin's resources.
    ///
    /// # Errors
    ///
    /// Failures are reported by the manager's unload.
    async fn shutdown(&self) -> zephyr_core::Result<()> {
        Ok(())
    }
}

/// Value a module exports under a symbol.
pub enum Export {
    /// The capability itself.
    Owned(Box<dyn DynamicPlugin>),
    /// A shared reference to a capability.
    Shared(Arc<dyn DynamicPlugin>),
    /// Something that is not a capability.
    Foreign {
        /// Type the module reported
        type_name: String,
    },
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(plugin) => f.debug_tuple("Owned").field(&plugin.name()).finish(),
            Self::Shared(plugin) => f.debug_tuple("Shared").field(&plugin.name()).finish(),
            Self::Foreign { type_name } => f
                .debug_struct("Foreign")
                .field("type_name", type_name)
                .finish(),
        }
    }
}

impl Export {
    /// Normalizes both capability forms to a shared handle.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::TypeMismatch`] for [`Export::Foreign`].
    pub fn into_plugin(self, symbol: &str) -> Result<Arc<dyn DynamicPlugin>> {
        match self {
            Self::Owned(plugin) => Ok(Arc::from(plugin)),
            Self::Shared(plugin) => Ok(plugin),
            Self::Foreign { type_name } => Err(PluginError::TypeMismatch {
                symbol: symbol.to_string(),
                type_name,
            }),
        }
    }
}

/// Presents a plugin capability as a registry tool.
///
/// The plugin's shutdown hook runs at most once: whichever of registry
/// cleanup and [`PluginToolAdapter::shutdown`] comes first invokes it, and
/// every later caller gets the recorded outcome.
pub struct PluginToolAdapter {
    plugin: Arc<dyn DynamicPlugin>,
    shutdown: OnceCell<std::result::Result<(), String>>,
}

impl fmt::Debug for PluginToolAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginToolAdapter")
            .field("plugin", &self.plugin.name())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl PluginToolAdapter {
    /// Wraps an initialized capability.
    #[must_use]
    pub fn new(plugin: Arc<dyn DynamicPlugin>) -> Self {
        Self {
            plugin,
            shutdown: OnceCell::new(),
        }
    }

    /// The wrapped capability.
    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn DynamicPlugin> {
        &self.plugin
    }

    /// Whether the shutdown hook has already run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.initialized()
    }

    /// Runs the plugin's shutdown hook once and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionFailed`] carrying the hook's message if
    /// the hook failed, on this call or an earlier one.
    pub async fn shutdown(&self) -> zephyr_core::Result<()> {
        let outcome = self
            .shutdown
            .get_or_init(|| async { self.plugin.shutdown().await.map_err(|e| e.to_string()) })
            .await;

        outcome
            .clone()
            .map_err(|message| Error::execution(self.plugin.name(), message))
    }
}

#[async_trait]
impl McpTool for PluginToolAdapter {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn version(&self) -> &str {
        self.plugin.version()
    }

    fn description(&self) -> &str {
        self.plugin.description()
    }

    fn input_schema(&self) -> JsonObject {
        self.plugin.input_schema()
    }

    fn definition(&self) -> ToolDescriptor {
        self.plugin.definition()
    }

    // The manager initializes the capability before registering it.
    async fn initialize(&self) -> zephyr_core::Result<()> {
        Ok(())
    }

    async fn execute(
        &self,
        ct: CancellationToken,
        args: Arguments,
    ) -> zephyr_core::Result<ToolOutput> {
        self.plugin.execute(ct, args).await
    }

    async fn cleanup(&self) -> zephyr_core::Result<()> {
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        shutdowns: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DynamicPlugin for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn version(&self) -> &str {
            "0.1.0"
        }

        fn description(&self) -> &str {
            "Counts shutdowns"
        }

        fn input_schema(&self) -> JsonObject {
            JsonObject::new()
        }

        async fn execute(
            &self,
            _ct: CancellationToken,
            _args: Arguments,
        ) -> zephyr_core::Result<ToolOutput> {
            Ok(ToolOutput::text("ok"))
        }

        async fn shutdown(&self) -> zephyr_core::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::execution("counting", "disk on fire"))
            } else {
                Ok(())
            }
        }
    }

    fn adapter(fail: bool) -> (Arc<Counting>, Arc<PluginToolAdapter>) {
        let plugin = Arc::new(Counting {
            shutdowns: AtomicUsize::new(0),
            fail,
        });
        let adapter = Arc::new(PluginToolAdapter::new(plugin.clone()));
        (plugin, adapter)
    }

    #[tokio::test]
    async fn test_cleanup_and_shutdown_share_one_call() {
        let (plugin, adapter) = adapter(false);

        adapter.cleanup().await.unwrap();
        adapter.shutdown().await.unwrap();
        adapter.cleanup().await.unwrap();

        assert_eq!(plugin.shutdowns.load(Ordering::SeqCst), 1);
        assert!(adapter.is_shut_down());
    }

    #[tokio::test]
    async fn test_failed_shutdown_is_replayed() {
        let (plugin, adapter) = adapter(true);

        let first = adapter.cleanup().await.unwrap_err();
        let second = adapter.shutdown().await.unwrap_err();

        assert!(first.to_string().contains("disk on fire"));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(plugin.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_shutdown_runs_once() {
        let (plugin, adapter) = adapter(false);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let adapter = Arc::clone(&adapter);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        adapter.shutdown().await
                    } else {
                        adapter.cleanup().await
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(plugin.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreign_export_is_type_mismatch() {
        let err = Export::Foreign {
            type_name: "i32".to_string(),
        }
        .into_plugin(PLUGIN_SYMBOL)
        .err()
        .expect("expected an error");

        assert!(matches!(err, PluginError::TypeMismatch { .. }));
        assert!(err.to_string().contains("i32"));
    }

    #[tokio::test]
    async fn test_adapter_delegates_to_plugin() {
        let (_, adapter) = adapter(false);

        assert_eq!(McpTool::name(adapter.as_ref()), "counting");
        assert_eq!(adapter.definition().description(), "Counts shutdowns");
        let output = adapter
            .execute(CancellationToken::new(), Arguments::new())
            .await
            .unwrap();
        assert_eq!(output.as_text(), Some("ok"));
    }
}
