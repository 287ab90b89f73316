//! Plugin lifecycle tests against a builtin loader.
//!
//! Each test lays out plugin directories in a temp dir and checks the
//! manager's state machine and its effect on the tool registry.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zephyr_core::{Arguments, Error, JsonObject, ToolOutput};
use zephyr_plugin::{
    BuiltinLoader, DynamicPlugin, Export, LoadPhase, PluginError, PluginLoader, PluginManager,
};
use zephyr_registry::ToolRegistry;

#[derive(Default)]
struct Counters {
    inits: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl Counters {
    fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

struct Echo {
    name: String,
    counters: Arc<Counters>,
    fail_init: bool,
    fail_shutdown: bool,
}

#[async_trait]
impl DynamicPlugin for Echo {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Echoes the text argument"
    }

    fn input_schema(&self) -> JsonObject {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    async fn initialize(&self) -> zephyr_core::Result<()> {
        self.counters.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(Error::execution(&self.name, "init refused"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        _ct: CancellationToken,
        args: Arguments,
    ) -> zephyr_core::Result<ToolOutput> {
        args.get("text")
            .and_then(Value::as_str)
            .map(ToolOutput::text)
            .ok_or_else(|| Error::execution(&self.name, "text is required"))
    }

    async fn shutdown(&self) -> zephyr_core::Result<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(Error::execution(&self.name, "shutdown refused"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
struct Behaviour {
    fail_init: bool,
    fail_shutdown: bool,
}

fn echo_entry(
    name: &str,
    counters: &Arc<Counters>,
    behaviour: Behaviour,
) -> zephyr_plugin::ExportFactory {
    let name = name.to_string();
    let counters = Arc::clone(counters);
    Arc::new(move || {
        Export::Owned(Box::new(Echo {
            name: name.clone(),
            counters: Arc::clone(&counters),
            fail_init: behaviour.fail_init,
            fail_shutdown: behaviour.fail_shutdown,
        }))
    })
}

/// Writes `base/dir/plugin.json` and an empty entry-point marker.
fn write_plugin(base: &Path, dir: &str, name: &str, entry: &str) {
    let directory = base.join(dir);
    std::fs::create_dir_all(&directory).unwrap();
    let manifest = json!({
        "name": name,
        "version": "1.0.0",
        "entry_point": entry,
        "description": format!("{name} from {dir}"),
    });
    std::fs::write(directory.join("plugin.json"), manifest.to_string()).unwrap();
    std::fs::write(directory.join(entry), b"").unwrap();
}

fn manager(base: &Path, loader: BuiltinLoader) -> (PluginManager, Arc<ToolRegistry>) {
    let registry = Arc::new(ToolRegistry::new());
    let loader: Arc<dyn PluginLoader> = Arc::new(loader);
    let manager = PluginManager::new(vec![base.to_path_buf()], Arc::clone(&registry), loader);
    (manager, registry)
}

fn text_args(text: &str) -> Arguments {
    let mut args = Arguments::new();
    args.insert("text".to_string(), json!(text));
    args
}

/// Tests discovery, load, invocation and unload of a single plugin
#[tokio::test]
async fn test_echo_plugin_round_trip() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "echo", "echo", "echo.plugin");
    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new().with_entry(
        "echo.plugin",
        echo_entry("echo", &counters, Behaviour::default()),
    );
    let (manager, registry) = manager(temp.path(), loader);

    assert_eq!(manager.discover_plugins().await.unwrap(), vec!["echo"]);
    manager.load_plugin("echo").await.unwrap();

    let tool = registry.get("echo").await.unwrap();
    assert_eq!(tool.definition().name(), "echo");
    let output = tool
        .execute(CancellationToken::new(), text_args("hi"))
        .await
        .unwrap();
    assert_eq!(output.as_text(), Some("hi"));

    let status = manager.get_plugin("echo").await.unwrap();
    assert!(status.discovered && status.loaded && status.enabled);
    assert!(status.loaded_at.is_some());
    assert_eq!(status.description, "echo from echo");

    manager.unload_plugin("echo").await.unwrap();
    assert!(!registry.contains("echo").await);
    assert_eq!(counters.shutdowns(), 1);

    let status = manager.get_plugin("echo").await.unwrap();
    assert!(status.discovered && !status.loaded);
    assert!(status.loaded_at.is_none());
}

/// Tests that a second discovery reports only new names
#[tokio::test]
async fn test_discovery_reports_new_names() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "a", "alpha", "a.plugin");
    let (manager, _) = manager(temp.path(), BuiltinLoader::new());

    assert_eq!(manager.discover_plugins().await.unwrap(), vec!["alpha"]);
    write_plugin(temp.path(), "b", "beta", "b.plugin");
    assert_eq!(manager.discover_plugins().await.unwrap(), vec!["beta"]);
    assert!(manager.discover_plugins().await.unwrap().is_empty());
    assert_eq!(manager.list_plugins().await.len(), 2);
}

/// Tests that missing base directories are created
#[tokio::test]
async fn test_discovery_creates_base_directory() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("not").join("yet");
    let (manager, _) = manager(&base, BuiltinLoader::new());

    assert!(manager.discover_plugins().await.unwrap().is_empty());
    assert!(base.is_dir());
}

/// Tests the duplicate-name tie-break across and within base directories
#[tokio::test]
async fn test_duplicate_names_first_wins() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write_plugin(second.path(), "aaa", "dup", "dup.plugin");
    write_plugin(first.path(), "zzz", "dup", "dup.plugin");
    write_plugin(first.path(), "mmm", "dup", "dup.plugin");

    let registry = Arc::new(ToolRegistry::new());
    let manager = PluginManager::new(
        vec![first.path().to_path_buf(), second.path().to_path_buf()],
        registry,
        Arc::new(BuiltinLoader::new()),
    );

    assert_eq!(manager.discover_plugins().await.unwrap(), vec!["dup"]);
    let status = manager.get_plugin("dup").await.unwrap();
    assert_eq!(status.directory, first.path().join("mmm"));
}

/// Tests that malformed manifests are skipped without failing discovery
#[tokio::test]
async fn test_malformed_manifests_are_skipped() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "good", "good", "good.plugin");

    let cases = [
        ("broken-json", "{ nope"),
        ("no-entry", r#"{"name": "a", "version": "1"}"#),
        ("empty-name", r#"{"name": "", "version": "1", "entry_point": "x"}"#),
        ("escape", r#"{"name": "b", "version": "1", "entry_point": "../x"}"#),
    ];
    for (dir, text) in cases {
        let directory = temp.path().join(dir);
        std::fs::create_dir_all(&directory).unwrap();
        std::fs::write(directory.join("plugin.json"), text).unwrap();
    }
    std::fs::create_dir_all(temp.path().join("no-manifest")).unwrap();
    std::fs::write(temp.path().join("stray-file"), b"").unwrap();

    let (manager, _) = manager(temp.path(), BuiltinLoader::new());
    assert_eq!(manager.discover_plugins().await.unwrap(), vec!["good"]);
}

/// Tests that loading a loaded plugin leaves the live instance alone
#[tokio::test]
async fn test_load_twice_is_rejected() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "echo", "echo", "echo.plugin");
    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new().with_entry(
        "echo.plugin",
        echo_entry("echo", &counters, Behaviour::default()),
    );
    let (manager, registry) = manager(temp.path(), loader);
    manager.discover_plugins().await.unwrap();
    manager.load_plugin("echo").await.unwrap();

    let err = manager.load_plugin("echo").await.unwrap_err();
    assert!(err.is_already_loaded());
    assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
    assert_eq!(counters.shutdowns(), 0);

    let output = registry
        .get("echo")
        .await
        .unwrap()
        .execute(CancellationToken::new(), text_args("still alive"))
        .await
        .unwrap();
    assert_eq!(output.as_text(), Some("still alive"));
}

/// Tests state errors for unknown and unloaded names
#[tokio::test]
async fn test_state_errors() {
    let temp = TempDir::new().unwrap();
    let (manager, _) = manager(temp.path(), BuiltinLoader::new());
    manager.discover_plugins().await.unwrap();

    let err = manager.load_plugin("ghost").await.unwrap_err();
    assert!(matches!(err, PluginError::NotDiscovered { .. }));
    let err = manager.unload_plugin("ghost").await.unwrap_err();
    assert!(err.is_not_loaded());
    assert!(manager.get_plugin("ghost").await.is_none());
}

/// Tests that reload shuts the old instance down exactly once
#[tokio::test]
async fn test_reload_shuts_down_once() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "echo", "echo", "echo.plugin");
    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new().with_entry(
        "echo.plugin",
        echo_entry("echo", &counters, Behaviour::default()),
    );
    let (manager, registry) = manager(temp.path(), loader);
    manager.discover_plugins().await.unwrap();
    manager.load_plugin("echo").await.unwrap();

    manager.reload_plugin("echo").await.unwrap();
    assert_eq!(counters.shutdowns(), 1);
    assert_eq!(counters.inits.load(Ordering::SeqCst), 2);
    assert!(registry.contains("echo").await);

    manager.unload_plugin("echo").await.unwrap();
    assert_eq!(counters.shutdowns(), 2);

    // Reloading an unloaded plugin just loads it.
    manager.reload_plugin("echo").await.unwrap();
    assert!(manager.is_loaded("echo").await);

    // Registry shutdown runs cleanup; the manager's unload then replays it.
    assert!(registry.shutdown().await.is_empty());
    assert_eq!(counters.shutdowns(), 3);
    manager.unload_all_plugins().await.unwrap();
    assert_eq!(counters.shutdowns(), 3);
}

/// Tests that a failed registration shuts the capability down
#[tokio::test]
async fn test_register_failure_shuts_down() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "echo", "echo", "echo.plugin");
    let counters = Arc::new(Counters::default());
    let occupant = Arc::new(Counters::default());
    let loader = BuiltinLoader::new().with_entry(
        "echo.plugin",
        echo_entry("echo", &counters, Behaviour::default()),
    );
    let (manager, registry) = manager(temp.path(), loader);

    let squatter = zephyr_plugin::PluginToolAdapter::new(Arc::new(Echo {
        name: "echo".to_string(),
        counters: Arc::clone(&occupant),
        fail_init: false,
        fail_shutdown: false,
    }));
    registry.register(Arc::new(squatter)).await.unwrap();

    manager.discover_plugins().await.unwrap();
    let err = manager.load_plugin("echo").await.unwrap_err();
    assert_eq!(err.phase(), Some(LoadPhase::Register));
    assert_eq!(counters.shutdowns(), 1);
    assert_eq!(occupant.shutdowns(), 0);

    let status = manager.get_plugin("echo").await.unwrap();
    assert!(!status.loaded);
    assert!(status.last_error.unwrap().contains("already registered"));
}

/// Tests that an initialize failure keeps the plugin out of the registry
#[tokio::test]
async fn test_init_failure() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "echo", "echo", "echo.plugin");
    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new().with_entry(
        "echo.plugin",
        echo_entry(
            "echo",
            &counters,
            Behaviour {
                fail_init: true,
                ..Behaviour::default()
            },
        ),
    );
    let (manager, registry) = manager(temp.path(), loader);
    manager.discover_plugins().await.unwrap();

    let err = manager.load_plugin("echo").await.unwrap_err();
    assert_eq!(err.phase(), Some(LoadPhase::Init));
    assert_eq!(err.plugin_name(), Some("echo"));
    assert!(!registry.contains("echo").await);
    assert_eq!(counters.shutdowns(), 0);
}

/// Tests that a failed shutdown still forgets the plugin
#[tokio::test]
async fn test_shutdown_failure_is_reported() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "echo", "echo", "echo.plugin");
    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new().with_entry(
        "echo.plugin",
        echo_entry(
            "echo",
            &counters,
            Behaviour {
                fail_shutdown: true,
                ..Behaviour::default()
            },
        ),
    );
    let (manager, registry) = manager(temp.path(), loader);
    manager.discover_plugins().await.unwrap();
    manager.load_plugin("echo").await.unwrap();

    let err = manager.unload_plugin("echo").await.unwrap_err();
    assert!(matches!(err, PluginError::Shutdown { .. }));
    assert_eq!(counters.shutdowns(), 1);
    assert!(!registry.contains("echo").await);

    let status = manager.get_plugin("echo").await.unwrap();
    assert!(!status.loaded);
    assert!(status.last_error.unwrap().contains("shutdown refused"));

    // The name can be loaded again.
    manager.load_plugin("echo").await.unwrap();
    assert!(manager.get_plugin("echo").await.unwrap().last_error.is_none());
}

/// Tests open and lookup failures
#[tokio::test]
async fn test_open_and_lookup_phases() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "unknown", "unknown", "unknown.bin");
    write_plugin(temp.path(), "foreign", "foreign", "foreign.plugin");
    write_plugin(temp.path(), "gone", "gone", "gone.plugin");
    std::fs::remove_file(temp.path().join("gone").join("gone.plugin")).unwrap();

    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new()
        .with_entry(
            "foreign.plugin",
            Arc::new(|| Export::Foreign {
                type_name: "u64".to_string(),
            }),
        )
        .with_entry(
            "gone.plugin",
            echo_entry("gone", &counters, Behaviour::default()),
        );
    let (manager, _) = manager(temp.path(), loader);
    manager.discover_plugins().await.unwrap();

    let err = manager.load_plugin("unknown").await.unwrap_err();
    assert_eq!(err.phase(), Some(LoadPhase::Open));

    let err = manager.load_plugin("gone").await.unwrap_err();
    assert_eq!(err.phase(), Some(LoadPhase::Open));
    assert!(err.to_string().contains("does not exist"));

    let err = manager.load_plugin("foreign").await.unwrap_err();
    assert_eq!(err.phase(), Some(LoadPhase::Lookup));
    assert!(err.to_string().contains("u64"));
}

/// Tests that a capability must carry its manifest name
#[tokio::test]
async fn test_name_mismatch() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "alias", "alias", "alias.plugin");
    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new().with_entry(
        "alias.plugin",
        echo_entry("someone-else", &counters, Behaviour::default()),
    );
    let (manager, registry) = manager(temp.path(), loader);
    manager.discover_plugins().await.unwrap();

    let err = manager.load_plugin("alias").await.unwrap_err();
    assert!(matches!(err, PluginError::NameMismatch { .. }));
    assert!(registry.is_empty().await);
}

/// Tests batch loading with a failure, a disabled plugin and a success
#[tokio::test]
async fn test_load_all_collects_failures() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "good", "good", "good.plugin");
    write_plugin(temp.path(), "bad", "bad", "bad.plugin");
    write_plugin(temp.path(), "off", "off", "off.plugin");

    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new()
        .with_entry("good.plugin", echo_entry("good", &counters, Behaviour::default()))
        .with_entry(
            "bad.plugin",
            echo_entry(
                "bad",
                &counters,
                Behaviour {
                    fail_init: true,
                    ..Behaviour::default()
                },
            ),
        )
        .with_entry("off.plugin", echo_entry("off", &counters, Behaviour::default()));
    let (manager, registry) = manager(temp.path(), loader);
    let manager = manager.with_disabled(["off"]);
    manager.discover_plugins().await.unwrap();

    let err = manager.load_all_plugins().await.unwrap_err();
    match &err {
        PluginError::Batch { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "bad");
        }
        other => panic!("expected batch error, got {other}"),
    }
    assert!(err.to_string().contains("bad"));

    assert!(registry.contains("good").await);
    assert!(!registry.contains("off").await);
    assert!(!manager.get_plugin("off").await.unwrap().enabled);

    // The failing plugin is retried; the loaded one is not touched again.
    let again = manager.load_all_plugins().await.unwrap_err();
    assert!(matches!(again, PluginError::Batch { .. }));
    assert_eq!(counters.inits.load(Ordering::SeqCst), 3);

    manager.unload_all_plugins().await.unwrap();
    assert!(registry.is_empty().await);
}

/// Tests that rescan loads only newly discovered plugins
#[tokio::test]
async fn test_rescan_loads_new_plugins() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "first", "first", "first.plugin");
    let counters = Arc::new(Counters::default());
    let loader = BuiltinLoader::new()
        .with_entry("first.plugin", echo_entry("first", &counters, Behaviour::default()))
        .with_entry("second.plugin", echo_entry("second", &counters, Behaviour::default()));
    let (manager, registry) = manager(temp.path(), loader);

    manager.discover_plugins().await.unwrap();
    assert!(manager.rescan().await.unwrap().is_empty());
    assert!(registry.is_empty().await);

    write_plugin(temp.path(), "second", "second", "second.plugin");
    assert_eq!(manager.rescan().await.unwrap(), vec!["second"]);
    assert!(registry.contains("second").await);
    assert!(!registry.contains("first").await);
}
