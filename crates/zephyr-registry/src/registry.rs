//! The tool registry.
//!
//! `ToolRegistry` is the single source of truth for what is currently
//! callable. Reads take a shared lock; every mutation holds the exclusive
//! lock for its whole duration, including the tool's lifecycle hook, so two
//! mutations never interleave.

use crate::discovery::{DiscoveryTask, ToolDiscovery};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zephyr_core::traits::McpTool;
use zephyr_core::{Error, Result};

/// Concurrency-safe catalogue of active tools.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use zephyr_core::traits::McpTool;
/// use zephyr_core::{Arguments, JsonObject, Result, ToolOutput};
/// use zephyr_registry::ToolRegistry;
///
/// struct Ping;
///
/// #[async_trait]
/// impl McpTool for Ping {
///     fn name(&self) -> &str { "ping" }
///     fn version(&self) -> &str { "1.0.0" }
///     fn description(&self) -> &str { "Replies with pong" }
///     fn input_schema(&self) -> JsonObject { JsonObject::new() }
///     async fn execute(&self, _ct: CancellationToken, _args: Arguments) -> Result<ToolOutput> {
///         Ok(ToolOutput::text("pong"))
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let registry = ToolRegistry::new();
/// registry.register(Arc::new(Ping)).await?;
/// assert!(registry.contains("ping").await);
///
/// registry.unregister("ping").await?;
/// assert!(registry.get("ping").await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn McpTool>>>,
    discovery: Mutex<Option<DiscoveryTask>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .tools
            .try_read()
            .map(|tools| tools.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ToolRegistry")
            .field("tools", &names)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// The tool's `initialize` hook runs under the exclusive lock and the
    /// tool is inserted only if it succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTool`] if the tool reports an empty name
    /// - [`Error::DuplicateTool`] if the name is already registered
    /// - [`Error::ToolInitialization`] if `initialize` fails
    pub async fn register(&self, tool: Arc<dyn McpTool>) -> Result<()> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(Error::InvalidTool {
                reason: "tool name cannot be empty".to_string(),
            });
        }

        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            return Err(Error::DuplicateTool { name });
        }

        tool.initialize()
            .await
            .map_err(|e| Error::ToolInitialization {
                name: name.clone(),
                source: Box::new(e),
            })?;

        info!(tool = %name, version = %tool.version(), "registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Removes a tool, running its `cleanup` hook first.
    ///
    /// Cleanup is best-effort: a failure is logged and the entry is removed
    /// anyway.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if no tool has this name.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        let mut tools = self.tools.write().await;
        let Some(tool) = tools.get(name).cloned() else {
            return Err(Error::ToolNotFound {
                name: name.to_string(),
            });
        };

        if let Err(e) = tool.cleanup().await {
            warn!(tool = %name, error = %e, "tool cleanup failed; removing anyway");
        }
        tools.remove(name);
        info!(tool = %name, "unregistered tool");
        Ok(())
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if no tool has this name.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn McpTool>> {
        self.tools
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ToolNotFound {
                name: name.to_string(),
            })
    }

    /// Returns a snapshot of every registered tool, sorted by name.
    ///
    /// The snapshot is independent of the registry and can be iterated
    /// while registrations continue.
    pub async fn list(&self) -> Vec<Arc<dyn McpTool>> {
        let mut snapshot: Vec<Arc<dyn McpTool>> =
            self.tools.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| a.name().cmp(b.name()));
        snapshot
    }

    /// Sorted names of every registered tool.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if a tool with this name is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Number of registered tools.
    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Returns `true` if no tools are registered.
    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// Static discovery hook.
    ///
    /// Tools are populated by the plugin manager, so this does nothing.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches discovery backends that can.
    pub async fn discover_tools(&self) -> Result<()> {
        debug!("tool population is managed by plugins; nothing to discover");
        Ok(())
    }

    /// Starts the periodic discovery loop.
    ///
    /// The loop stops when `parent` is cancelled or on
    /// [`stop_periodic_discovery`](Self::stop_periodic_discovery).
    ///
    /// # Errors
    ///
    /// - [`Error::DiscoveryAlreadyRunning`] if a loop is already running
    /// - [`Error::InvalidArgument`] if `interval` is zero
    pub async fn start_periodic_discovery(
        &self,
        interval: Duration,
        source: Arc<dyn ToolDiscovery>,
        parent: &CancellationToken,
    ) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::InvalidArgument(
                "discovery interval must be positive".to_string(),
            ));
        }

        let mut slot = self.discovery.lock().await;
        if slot.as_ref().is_some_and(DiscoveryTask::is_running) {
            return Err(Error::DiscoveryAlreadyRunning);
        }

        *slot = Some(DiscoveryTask::spawn(interval, source, parent));
        info!(interval = ?interval, "started periodic discovery");
        Ok(())
    }

    /// Stops the periodic discovery loop and waits for it to exit.
    ///
    /// Does nothing if no loop is running. The loop can be started again
    /// afterwards.
    pub async fn stop_periodic_discovery(&self) {
        let task = self.discovery.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
            info!("stopped periodic discovery");
        }
    }

    /// Returns `true` while the periodic discovery loop is running.
    pub async fn is_discovery_running(&self) -> bool {
        self.discovery
            .lock()
            .await
            .as_ref()
            .is_some_and(DiscoveryTask::is_running)
    }

    /// Stops discovery, cleans up every tool and empties the registry.
    ///
    /// Cleanup failures are logged and returned as `"name: error"` strings;
    /// they never stop the remaining tools from being cleaned up.
    pub async fn shutdown(&self) -> Vec<String> {
        self.stop_periodic_discovery().await;

        let mut tools = self.tools.write().await;
        let mut entries: Vec<(String, Arc<dyn McpTool>)> = tools.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut failures = Vec::new();
        for (name, tool) in entries {
            if let Err(e) = tool.cleanup().await {
                warn!(tool = %name, error = %e, "tool cleanup failed during shutdown");
                failures.push(format!("{name}: {e}"));
            }
        }

        info!(failures = failures.len(), "tool registry shut down");
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use zephyr_core::{Arguments, JsonObject, ToolOutput};

    #[derive(Default)]
    struct TestTool {
        name: String,
        fail_init: bool,
        fail_cleanup: bool,
        init_calls: AtomicUsize,
        cleanup_calls: AtomicUsize,
    }

    impl TestTool {
        fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl McpTool for TestTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> &str {
            "0.1.0"
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn input_schema(&self) -> JsonObject {
            JsonObject::new()
        }

        async fn initialize(&self) -> Result<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(Error::execution(&self.name, "init refused"));
            }
            Ok(())
        }

        async fn execute(&self, _ct: CancellationToken, _args: Arguments) -> Result<ToolOutput> {
            Ok(ToolOutput::text(self.name.clone()))
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_cleanup {
                return Err(Error::execution(&self.name, "cleanup refused"));
            }
            Ok(())
        }
    }

    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl ToolDiscovery for CountingSource {
        async fn discover(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records whether a pass that started also finished.
    #[derive(Default)]
    struct SlowSource {
        started: AtomicBool,
        finished: AtomicBool,
    }

    #[async_trait]
    impl ToolDiscovery for SlowSource {
        async fn discover(&self) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = ToolRegistry::new();
        let tool = Arc::new(TestTool::named("alpha"));
        registry.register(tool.clone()).await.unwrap();

        assert_eq!(tool.init_calls.load(Ordering::SeqCst), 1);
        let found = registry.get("alpha").await.unwrap();
        assert_eq!(found.name(), "alpha");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_name() {
        let registry = ToolRegistry::new();
        let err = registry
            .register(Arc::new(TestTool::named("")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTool { .. }));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_without_initializing() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(TestTool::named("alpha")))
            .await
            .unwrap();

        let second = Arc::new(TestTool::named("alpha"));
        let err = registry.register(second.clone()).await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(second.init_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_initialize_is_not_inserted() {
        let registry = ToolRegistry::new();
        let tool = Arc::new(TestTool {
            name: "broken".to_string(),
            fail_init: true,
            ..TestTool::default()
        });

        let err = registry.register(tool).await.unwrap_err();
        assert!(matches!(err, Error::ToolInitialization { .. }));
        assert!(!registry.contains("broken").await);
    }

    #[tokio::test]
    async fn test_unregister_removes_even_when_cleanup_fails() {
        let registry = ToolRegistry::new();
        let tool = Arc::new(TestTool {
            name: "sticky".to_string(),
            fail_cleanup: true,
            ..TestTool::default()
        });
        registry.register(tool.clone()).await.unwrap();

        registry.unregister("sticky").await.unwrap();
        assert_eq!(tool.cleanup_calls.load(Ordering::SeqCst), 1);
        assert!(registry.get("sticky").await.err().expect("expected an error").is_not_found());
    }

    #[tokio::test]
    async fn test_unregister_unknown_name() {
        let registry = ToolRegistry::new();
        let err = registry.unregister("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_is_sorted_snapshot() {
        let registry = ToolRegistry::new();
        for name in ["gamma", "alpha", "beta"] {
            registry.register(Arc::new(TestTool::named(name))).await.unwrap();
        }

        let snapshot = registry.list().await;
        registry.unregister("beta").await.unwrap();

        let names: Vec<&str> = snapshot.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(registry.names().await, vec!["alpha", "gamma"]);
    }

    #[tokio::test]
    async fn test_shutdown_cleans_every_entry() {
        let registry = ToolRegistry::new();
        let good = Arc::new(TestTool::named("good"));
        let bad = Arc::new(TestTool {
            name: "bad".to_string(),
            fail_cleanup: true,
            ..TestTool::default()
        });
        registry.register(good.clone()).await.unwrap();
        registry.register(bad.clone()).await.unwrap();

        let failures = registry.shutdown().await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("bad:"));
        assert_eq!(good.cleanup_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bad.cleanup_calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_discover_tools_is_noop() {
        let registry = ToolRegistry::new();
        registry.discover_tools().await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_discovery_lifecycle() {
        let registry = ToolRegistry::new();
        let root = CancellationToken::new();
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));

        registry
            .start_periodic_discovery(Duration::from_millis(10), source.clone(), &root)
            .await
            .unwrap();
        assert!(registry.is_discovery_running().await);

        let err = registry
            .start_periodic_discovery(Duration::from_millis(10), source.clone(), &root)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DiscoveryAlreadyRunning));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(source.0.load(Ordering::SeqCst) >= 2);

        registry.stop_periodic_discovery().await;
        assert!(!registry.is_discovery_running().await);
        let after_stop = source.0.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), after_stop);

        // Double stop is a no-op and the loop can be restarted.
        registry.stop_periodic_discovery().await;
        registry
            .start_periodic_discovery(Duration::from_millis(10), source.clone(), &root)
            .await
            .unwrap();
        assert!(registry.is_discovery_running().await);
        registry.shutdown().await;
        assert!(!registry.is_discovery_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_discovery() {
        let registry = ToolRegistry::new();
        let root = CancellationToken::new();
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        registry
            .start_periodic_discovery(Duration::from_millis(10), source.clone(), &root)
            .await
            .unwrap();

        root.cancel();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!registry.is_discovery_running().await);
        assert_eq!(source.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_running_pass_finish() {
        let registry = ToolRegistry::new();
        let source = Arc::new(SlowSource::default());
        let root = CancellationToken::new();
        registry
            .start_periodic_discovery(Duration::from_millis(10), source.clone(), &root)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(source.started.load(Ordering::SeqCst));
        assert!(!source.finished.load(Ordering::SeqCst));

        registry.stop_periodic_discovery().await;
        assert!(source.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let registry = ToolRegistry::new();
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let err = registry
            .start_periodic_discovery(Duration::ZERO, source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
