use super::{PluginLoader, PluginModule};
use crate::capability::{DynamicPlugin, Export};
use crate::error::{PluginError, Result};
use crate::protocol::{
    KIND_TOOL, LookupReply, METHOD_CANCEL, METHOD_EXECUTE, METHOD_INITIALIZE, METHOD_LOOKUP,
    METHOD_SHUTDOWN, Request, Response,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zephyr_core::{Arguments, Error, JsonObject, ToolDescriptor, ToolOutput};

/// Time limits applied to sidecar calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidecarTimeouts {
    /// Limit for `execute` and `shutdown`
    pub request: Duration,
    /// Limit for `lookup` and `initialize`
    pub handshake: Duration,
    /// How long to wait for the process to exit after `shutdown`
    pub exit: Duration,
}

impl Default for SidecarTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            handshake: Duration::from_secs(10),
            exit: Duration::from_secs(5),
        }
    }
}

/// Loader that runs each entry point as a sidecar process.
///
/// The child inherits stderr, runs in its plugin directory and is killed
/// when the last handle to it is dropped.
#[derive(Debug, Clone, Default)]
pub struct ProcessLoader {
    timeouts: SidecarTimeouts,
}

impl ProcessLoader {
    /// Creates a loader with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the call timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: SidecarTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

#[async_trait]
impl PluginLoader for ProcessLoader {
    async fn open(&self, entry: &Path) -> Result<Box<dyn PluginModule>> {
        let mut command = Command::new(entry);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = entry.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let open_error = |reason: String| PluginError::Open {
            entry: entry.to_path_buf(),
            reason,
        };
        let mut child = command
            .spawn()
            .map_err(|e| open_error(format!("failed to spawn: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| open_error("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| open_error("child stdout unavailable".to_string()))?;

        info!(entry = %entry.display(), pid = ?child.id(), "spawned sidecar plugin");
        let client = SidecarClient::new(stdout, stdin, self.timeouts, Some(child));
        Ok(Box::new(SidecarModule {
            client: Arc::new(client),
        }))
    }
}

/// Module whose capability lives on the other end of a byte stream.
pub struct SidecarModule {
    client: Arc<SidecarClient>,
}

impl fmt::Debug for SidecarModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SidecarModule")
            .field("timeouts", &self.client.timeouts)
            .finish_non_exhaustive()
    }
}

impl SidecarModule {
    /// Talks to a sidecar runtime over an existing reader/writer pair.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect<R, W>(reader: R, writer: W, timeouts: SidecarTimeouts) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            client: Arc::new(SidecarClient::new(reader, writer, timeouts, None)),
        }
    }
}

#[async_trait]
impl PluginModule for SidecarModule {
    async fn lookup(&self, symbol: &str) -> Result<Export> {
        let reply = self
            .client
            .call(
                METHOD_LOOKUP,
                json!({ "symbol": symbol }),
                self.client.timeouts.handshake,
            )
            .await
            .map_err(|e| match e {
                CallError::Remote(_) => PluginError::SymbolNotFound {
                    symbol: symbol.to_string(),
                },
                other => other.into_protocol(),
            })?;

        let reply: LookupReply =
            serde_json::from_value(reply).map_err(|e| PluginError::Protocol {
                message: format!("malformed lookup reply: {e}"),
            })?;
        if reply.kind != KIND_TOOL {
            return Ok(Export::Foreign {
                type_name: reply.kind,
            });
        }

        let definition = reply.definition.clone().unwrap_or_else(|| {
            ToolDescriptor::new(&reply.name, &reply.description, reply.input_schema.clone())
        });
        Ok(Export::Shared(Arc::new(SidecarPlugin {
            client: Arc::clone(&self.client),
            reply,
            definition,
        })))
    }
}

/// Capability proxy forwarding calls to a sidecar.
struct SidecarPlugin {
    client: Arc<SidecarClient>,
    reply: LookupReply,
    definition: ToolDescriptor,
}

#[async_trait]
impl DynamicPlugin for SidecarPlugin {
    fn name(&self) -> &str {
        &self.reply.name
    }

    fn version(&self) -> &str {
        &self.reply.version
    }

    fn description(&self) -> &str {
        &self.reply.description
    }

    fn input_schema(&self) -> JsonObject {
        self.reply.input_schema.clone()
    }

    fn definition(&self) -> ToolDescriptor {
        self.definition.clone()
    }

    async fn initialize(&self) -> zephyr_core::Result<()> {
        self.client
            .call(METHOD_INITIALIZE, Value::Null, self.client.timeouts.handshake)
            .await
            .map(|_| ())
            .map_err(|e| e.into_tool_error(self.name(), METHOD_INITIALIZE))
    }

    async fn execute(
        &self,
        ct: CancellationToken,
        args: Arguments,
    ) -> zephyr_core::Result<ToolOutput> {
        let (id, reply) = self
            .client
            .send(METHOD_EXECUTE, json!({ "arguments": args }))
            .await
            .map_err(|e| e.into_tool_error(self.name(), METHOD_EXECUTE))?;

        let value = tokio::select! {
            biased;
            () = ct.cancelled() => {
                self.client.forget(id);
                self.client.notify(METHOD_CANCEL, json!({ "id": id })).await;
                return Err(Error::Cancelled {
                    operation: format!("tool {}", self.name()),
                });
            }
            outcome = self.client.wait(id, reply, self.client.timeouts.request) => match outcome {
                Ok(value) => value,
                Err(e) => {
                    if matches!(e, CallError::TimedOut(_)) {
                        self.client.notify(METHOD_CANCEL, json!({ "id": id })).await;
                    }
                    return Err(e.into_tool_error(self.name(), METHOD_EXECUTE));
                }
            },
        };

        Ok(serde_json::from_value(value)?)
    }

    async fn shutdown(&self) -> zephyr_core::Result<()> {
        let outcome = self
            .client
            .call(METHOD_SHUTDOWN, Value::Null, self.client.timeouts.request)
            .await;
        self.client.reap().await;
        outcome
            .map(|_| ())
            .map_err(|e| e.into_tool_error(self.name(), METHOD_SHUTDOWN))
    }
}

type Reply = std::result::Result<Value, String>;

#[derive(Default)]
struct Pending {
    calls: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
}

enum CallError {
    Closed,
    Io(std::io::Error),
    Remote(String),
    TimedOut(Duration),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("sidecar process exited"),
            Self::Io(e) => write!(f, "failed to write to sidecar: {e}"),
            Self::Remote(message) => f.write_str(message),
            Self::TimedOut(limit) => write!(f, "no reply within {limit:?}"),
        }
    }
}

impl CallError {
    fn into_protocol(self) -> PluginError {
        PluginError::Protocol {
            message: self.to_string(),
        }
    }

    fn into_tool_error(self, tool: &str, method: &str) -> Error {
        match self {
            Self::TimedOut(limit) => Error::Timeout {
                operation: format!("{method} on plugin {tool}"),
                duration: limit,
            },
            other => Error::execution(tool, other.to_string()),
        }
    }
}

/// Multiplexes calls over one sidecar connection.
///
/// A background task reads responses and completes the matching pending
/// call. When the stream ends every pending call fails.
struct SidecarClient {
    timeouts: SidecarTimeouts,
    next_id: AtomicU64,
    pending: Arc<Mutex<Pending>>,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl SidecarClient {
    fn new<R, W>(reader: R, writer: W, timeouts: SidecarTimeouts, child: Option<Child>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending::default()));
        tokio::spawn(route_responses(reader, Arc::clone(&pending)));

        Self {
            timeouts,
            next_id: AtomicU64::new(1),
            pending,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            child: tokio::sync::Mutex::new(child),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        limit: Duration,
    ) -> std::result::Result<Value, CallError> {
        let (id, reply) = self.send(method, params).await?;
        self.wait(id, reply, limit).await
    }

    async fn send(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<(u64, oneshot::Receiver<Reply>), CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(CallError::Closed);
            }
            pending.calls.insert(id, tx);
        }

        if let Err(e) = self.write(id, method, params).await {
            self.forget(id);
            return Err(CallError::Io(e));
        }
        Ok((id, rx))
    }

    async fn wait(
        &self,
        id: u64,
        reply: oneshot::Receiver<Reply>,
        limit: Duration,
    ) -> std::result::Result<Value, CallError> {
        match tokio::time::timeout(limit, reply).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(CallError::Remote(message)),
            Ok(Err(_)) => Err(CallError::Closed),
            Err(_) => {
                self.forget(id);
                Err(CallError::TimedOut(limit))
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.write(id, method, params).await {
            debug!(method, error = %e, "sidecar notification not delivered");
        }
    }

    fn forget(&self, id: u64) {
        lock(&self.pending).calls.remove(&id);
    }

    async fn write(&self, id: u64, method: &str, params: Value) -> std::io::Result<()> {
        let request = Request {
            id,
            method: method.to_string(),
            params,
        };
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await
    }

    /// Waits for the child to exit after `shutdown`, killing it if it lingers.
    async fn reap(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(self.timeouts.exit, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for sidecar"),
            Err(_) => {
                warn!(limit = ?self.timeouts.exit, "sidecar did not exit; killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill sidecar");
                }
            }
        }
    }
}

async fn route_responses<R>(reader: R, pending: Arc<Mutex<Pending>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<Response>(&line) {
                Ok(response) => {
                    let id = response.id;
                    let caller = lock(&pending).calls.remove(&id);
                    match caller {
                        Some(caller) => {
                            let _ = caller.send(response.into_result());
                        }
                        None => debug!(id, "dropping reply for abandoned call"),
                    }
                }
                Err(e) => warn!(error = %e, "malformed line from sidecar"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read from sidecar");
                break;
            }
        }
    }

    // Dropping the senders fails every outstanding call.
    let mut pending = lock(&pending);
    pending.closed = true;
    pending.calls.clear();
}

fn lock(pending: &Mutex<Pending>) -> std::sync::MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
