//! Shared fixtures: in-process plugins and an app served over an in-memory
//! stream instead of stdin/stdout.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_util::sync::CancellationToken;
use zephyr_core::{Arguments, Config, Error, JsonObject, ToolOutput};
use zephyr_plugin::{BuiltinLoader, DynamicPlugin, Export, ExportFactory};
use zephyr_server::App;
use zephyr_transport::{BoxedReader, BoxedWriter, StdioAdapter, StreamFactory, TransportAdapter};

#[derive(Default)]
pub struct Counters {
    pub inits: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl Counters {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Returns the `text` argument
    Echo,
    /// Sleeps far longer than any test timeout
    Slow,
    /// Returns a two-byte PNG payload
    Image,
    /// Refuses to initialize
    Broken,
}

struct TestPlugin {
    name: String,
    kind: Kind,
    counters: Arc<Counters>,
}

#[async_trait]
impl DynamicPlugin for TestPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Test plugin"
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
        if self.kind == Kind::Broken {
            return Err(Error::execution(&self.name, "init refused"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        _ct: CancellationToken,
        args: Arguments,
    ) -> zephyr_core::Result<ToolOutput> {
        match self.kind {
            Kind::Echo => args
                .get("text")
                .and_then(Value::as_str)
                .map(ToolOutput::text)
                .ok_or_else(|| Error::execution(&self.name, "text is required")),
            Kind::Slow => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ToolOutput::text("too late"))
            }
            Kind::Image => Ok(ToolOutput::binary(vec![0x89, 0x50], "image/png")),
            Kind::Broken => Err(Error::execution(&self.name, "never loaded")),
        }
    }

    async fn shutdown(&self) -> zephyr_core::Result<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn entry(name: &str, kind: Kind, counters: &Arc<Counters>) -> ExportFactory {
    let name = name.to_string();
    let counters = Arc::clone(counters);
    Arc::new(move || {
        Export::Owned(Box::new(TestPlugin {
            name: name.clone(),
            kind,
            counters: Arc::clone(&counters),
        }))
    })
}

/// Writes `base/<name>/plugin.json` with entry point `<name>.bin`.
pub fn write_plugin(base: &Path, name: &str) {
    let directory = base.join(name);
    std::fs::create_dir_all(&directory).unwrap();
    let manifest = json!({
        "name": name,
        "version": "1.0.0",
        "entry_point": format!("{name}.bin"),
        "description": format!("{name} test plugin"),
    });
    std::fs::write(directory.join("plugin.json"), manifest.to_string()).unwrap();
    std::fs::write(directory.join(format!("{name}.bin")), b"").unwrap();
}

/// Lays out one plugin per `(name, kind)` and returns a loader for them.
pub fn plugins(base: &Path, specs: &[(&str, Kind)], counters: &Arc<Counters>) -> BuiltinLoader {
    specs.iter().fold(BuiltinLoader::new(), |loader, (name, kind)| {
        write_plugin(base, name);
        loader.with_entry(format!("{name}.bin"), entry(name, *kind, counters))
    })
}

/// Quiet configuration: no rescans, no monitoring, short request timeout.
pub fn config(base: &Path) -> Config {
    let mut config = Config::default();
    config.plugins.discovery.directories = vec![base.to_path_buf()];
    config.plugins.discovery.enabled = false;
    config.monitoring.enabled = false;
    config.security.timeout.request = Duration::from_millis(300);
    config.security.timeout.shutdown = Duration::from_secs(10);
    config
}

/// Builds an app whose stdio transport runs over an in-memory pipe; the
/// returned stream is the client's end.
pub fn duplex_app(config: Config, loader: BuiltinLoader) -> (App, DuplexStream) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let (read_half, write_half) = tokio::io::split(server_io);
    let pair: Mutex<Option<(BoxedReader, BoxedWriter)>> =
        Mutex::new(Some((Box::new(read_half), Box::new(write_half))));
    let streams: StreamFactory = Arc::new(move || {
        pair.lock()
            .unwrap()
            .take()
            .ok_or_else(|| std::io::Error::other("streams already used"))
    });

    let app = App::with_transport(config, Arc::new(loader), |service| {
        let adapter: Box<dyn TransportAdapter> =
            Box::new(StdioAdapter::with_streams(service, streams));
        Ok(adapter)
    })
    .unwrap();
    (app, client_io)
}

pub fn text_args(text: &str) -> Arguments {
    let mut args = Arguments::new();
    args.insert("text".to_string(), json!(text));
    args
}

/// Polls `check` every 20ms for up to five seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
