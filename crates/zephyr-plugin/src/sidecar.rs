//! Plugin-side runtime for sidecar plugins.
//!
//! A sidecar binary wraps its capability and hands it to [`serve_stdio`]:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use zephyr_plugin::DynamicPlugin;
//! # async fn run(plugin: Arc<dyn DynamicPlugin>) -> std::io::Result<()> {
//! zephyr_plugin::sidecar::serve_stdio(plugin).await
//! # }
//! ```
//!
//! Each `execute` runs on its own task so a `cancel` for it can be handled
//! while it is in flight. Logging must go to stderr; stdout carries the
//! protocol.

use crate::capability::{DynamicPlugin, PLUGIN_SYMBOL};
use crate::protocol::{
    KIND_TOOL, LookupReply, METHOD_CANCEL, METHOD_EXECUTE, METHOD_INITIALIZE, METHOD_LOOKUP,
    METHOD_SHUTDOWN, Request, Response,
};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zephyr_core::Arguments;

type InFlight = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// Serves `plugin` over the process's stdin and stdout.
///
/// # Errors
///
/// Returns an I/O error if reading requests or writing responses fails.
pub async fn serve_stdio(plugin: Arc<dyn DynamicPlugin>) -> io::Result<()> {
    serve(plugin, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serves `plugin` over a reader/writer pair until `shutdown` or end of input.
///
/// # Errors
///
/// Returns an I/O error if reading requests or writing responses fails.
pub async fn serve<R, W>(plugin: Arc<dyn DynamicPlugin>, reader: R, writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Response>();
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let in_flight: InFlight = Arc::default();

    let mut lines = BufReader::new(reader).lines();
    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "ignoring malformed request");
                continue;
            }
        };

        match request.method.as_str() {
            METHOD_LOOKUP => {
                let _ = tx.send(lookup(plugin.as_ref(), &request));
            }
            METHOD_INITIALIZE => {
                let response = match plugin.initialize().await {
                    Ok(()) => Response::ok(request.id, Value::Null),
                    Err(e) => Response::error(request.id, e.to_string()),
                };
                let _ = tx.send(response);
            }
            METHOD_EXECUTE => execute(&plugin, &in_flight, &tx, request),
            METHOD_CANCEL => {
                let target = request.params.get("id").and_then(Value::as_u64);
                if let Some(ct) = target.and_then(|id| lock(&in_flight).remove(&id)) {
                    debug!(id = ?target, "cancelling call");
                    ct.cancel();
                }
            }
            METHOD_SHUTDOWN => {
                cancel_all(&in_flight);
                let response = match plugin.shutdown().await {
                    Ok(()) => Response::ok(request.id, Value::Null),
                    Err(e) => Response::error(request.id, e.to_string()),
                };
                let _ = tx.send(response);
                break Ok(());
            }
            other => {
                let _ = tx.send(Response::error(
                    request.id,
                    format!("unknown method: {other}"),
                ));
            }
        }
    };

    cancel_all(&in_flight);
    drop(tx);
    let write_result = writer_task
        .await
        .map_err(|e| io::Error::other(format!("response writer panicked: {e}")))?;
    read_result.and(write_result)
}

fn lookup(plugin: &dyn DynamicPlugin, request: &Request) -> Response {
    let symbol = request.params.get("symbol").and_then(Value::as_str);
    if symbol != Some(PLUGIN_SYMBOL) {
        return Response::error(
            request.id,
            format!("symbol not found: {}", symbol.unwrap_or_default()),
        );
    }

    let reply = LookupReply {
        kind: KIND_TOOL.to_string(),
        name: plugin.name().to_string(),
        version: plugin.version().to_string(),
        description: plugin.description().to_string(),
        input_schema: plugin.input_schema(),
        definition: Some(plugin.definition()),
    };
    match serde_json::to_value(reply) {
        Ok(value) => Response::ok(request.id, value),
        Err(e) => Response::error(request.id, e.to_string()),
    }
}

fn execute(
    plugin: &Arc<dyn DynamicPlugin>,
    in_flight: &InFlight,
    tx: &mpsc::UnboundedSender<Response>,
    request: Request,
) {
    let args: Arguments = match request.params.get("arguments") {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => {
            let _ = tx.send(Response::error(request.id, "arguments must be an object"));
            return;
        }
    };

    let id = request.id;
    let ct = CancellationToken::new();
    lock(in_flight).insert(id, ct.clone());

    let plugin = Arc::clone(plugin);
    let in_flight = Arc::clone(in_flight);
    let tx = tx.clone();
    tokio::spawn(async move {
        let response = match plugin.execute(ct, args).await {
            Ok(output) => match serde_json::to_value(output) {
                Ok(value) => Response::ok(id, value),
                Err(e) => Response::error(id, e.to_string()),
            },
            Err(e) => Response::error(id, e.to_string()),
        };
        lock(&in_flight).remove(&id);
        let _ = tx.send(response);
    });
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Response>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn cancel_all(in_flight: &InFlight) {
    for (_, ct) in lock(in_flight).drain() {
        ct.cancel();
    }
}

fn lock(
    in_flight: &Mutex<HashMap<u64, CancellationToken>>,
) -> std::sync::MutexGuard<'_, HashMap<u64, CancellationToken>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use zephyr_core::{JsonObject, ToolOutput};

    struct Upper;

    #[async_trait]
    impl DynamicPlugin for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn version(&self) -> &str {
            "0.2.0"
        }

        fn description(&self) -> &str {
            "Uppercases text"
        }

        fn input_schema(&self) -> JsonObject {
            JsonObject::new()
        }

        async fn execute(
            &self,
            _ct: CancellationToken,
            args: Arguments,
        ) -> zephyr_core::Result<ToolOutput> {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(ToolOutput::text(text.to_uppercase()))
        }
    }

    async fn exchange(input: &str) -> Vec<Value> {
        use tokio::io::AsyncReadExt;

        let (mut host, guest) = tokio::io::duplex(64 * 1024);
        serve(Arc::new(Upper), input.as_bytes(), guest).await.unwrap();

        let mut output = String::new();
        host.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_scripted_session() {
        let input = [
            r#"{"id":1,"method":"lookup","params":{"symbol":"ZephyrPlugin"}}"#,
            r#"{"id":2,"method":"initialize"}"#,
            "not json",
            r#"{"id":3,"method":"frobnicate"}"#,
            r#"{"id":4,"method":"shutdown"}"#,
            r#"{"id":5,"method":"initialize"}"#,
        ]
        .join("\n");

        let responses = exchange(&input).await;
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0]["result"]["kind"], "tool");
        assert_eq!(responses[0]["result"]["name"], "upper");
        assert_eq!(responses[1], json!({"id": 2, "result": null}));
        assert!(
            responses[2]["error"]["message"]
                .as_str()
                .unwrap()
                .contains("frobnicate")
        );
        assert_eq!(responses[3], json!({"id": 4, "result": null}));
    }

    #[tokio::test]
    async fn test_lookup_of_unknown_symbol() {
        let responses =
            exchange(r#"{"id":1,"method":"lookup","params":{"symbol":"Other"}}"#).await;
        assert!(responses[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Other"));
    }

    #[tokio::test]
    async fn test_execute_rejects_non_object_arguments() {
        let responses =
            exchange(r#"{"id":9,"method":"execute","params":{"arguments":[1,2]}}"#).await;
        assert_eq!(responses[0]["id"], 9);
        assert!(responses[0]["error"].is_object());
    }
}
