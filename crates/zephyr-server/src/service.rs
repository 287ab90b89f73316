//! MCP protocol handler backed by the tool registry.
//!
//! The tool set changes at runtime as plugins are loaded and unloaded, so
//! `list_tools` and `call_tool` are answered from a fresh registry snapshot
//! on every request rather than from a static router.

use crate::metrics::MetricsCollector;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zephyr_core::{Arguments, JsonObject, ToolOutput};
use zephyr_registry::ToolRegistry;

/// How long a timed-out tool gets to observe its cancellation.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Name and version reported to clients during initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// Implementation name
    pub name: String,
    /// Implementation version
    pub version: String,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: "zephyr-mcp-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// MCP server handler dispatching tool calls to the registry.
///
/// Cheap to clone; clones share the registry and metrics.
#[derive(Debug, Clone)]
pub struct ZephyrService {
    registry: Arc<ToolRegistry>,
    metrics: Arc<MetricsCollector>,
    identity: ServerIdentity,
    request_timeout: Option<Duration>,
}

impl ZephyrService {
    /// Creates a handler over `registry`, recording into `metrics`.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        metrics: Arc<MetricsCollector>,
        identity: ServerIdentity,
    ) -> Self {
        Self {
            registry,
            metrics,
            identity,
            request_timeout: None,
        }
    }

    /// Bounds every tool call by `timeout`.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Registry this handler dispatches to.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Protocol descriptors for every registered tool, sorted by name.
    pub async fn tools(&self) -> Vec<Tool> {
        self.registry
            .list()
            .await
            .iter()
            .map(|tool| {
                let definition = tool.definition();
                Tool::new(
                    definition.name().to_string(),
                    definition.description().to_string(),
                    Arc::new(translate_schema(definition.input_schema())),
                )
            })
            .collect()
    }

    /// Runs one tool call and converts the outcome into a protocol result.
    ///
    /// Tool failures become error results rather than protocol errors, so
    /// the caller sees the message.
    ///
    /// # Errors
    ///
    /// Returns an `invalid_params` protocol error if no tool has this name.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Arguments>,
        ct: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        let tool = self
            .registry
            .get(name)
            .await
            .map_err(|_| McpError::invalid_params(format!("tool not found: {name}"), None))?;
        let arguments = arguments.unwrap_or_default();

        let started = Instant::now();
        let outcome = match self.request_timeout {
            Some(limit) => {
                let call_ct = ct.child_token();
                let mut call = tool.execute(call_ct.clone(), arguments);
                tokio::select! {
                    outcome = &mut call => outcome,
                    () = tokio::time::sleep(limit) => {
                        // The tool only sees the token while its future is polled.
                        call_ct.cancel();
                        if tokio::time::timeout(CANCEL_GRACE, &mut call).await.is_err() {
                            warn!(tool = %name, grace = ?CANCEL_GRACE, "tool ignored cancellation");
                        }
                        Err(zephyr_core::Error::Timeout {
                            operation: format!("tool {name}"),
                            duration: limit,
                        })
                    }
                }
            }
            None => tool.execute(ct, arguments).await,
        };
        let elapsed = started.elapsed();
        self.metrics.record(name, elapsed, outcome.is_ok()).await;

        match outcome {
            Ok(output) => {
                debug!(tool = %name, elapsed = ?elapsed, "tool call succeeded");
                Ok(CallToolResult::success(vec![to_content(output)]))
            }
            Err(e) => {
                warn!(tool = %name, elapsed = ?elapsed, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Error executing tool {name}: {e}"
                ))]))
            }
        }
    }
}

impl ServerHandler for ZephyrService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.identity.name.clone(),
                version: self.identity.version.clone(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "Tools are provided by loaded plugins; call tools/list for the current set."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools().await))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(&request.name, request.arguments, context.ct)
            .await
    }
}

/// Normalizes a tool's declared schema into an object schema.
///
/// A schema whose `properties` is an object keeps it, plus the string
/// entries of `required`. Any other schema is taken to be the properties
/// map itself.
#[must_use]
pub fn translate_schema(schema: &JsonObject) -> JsonObject {
    let mut translated = JsonObject::new();
    translated.insert("type".to_string(), Value::from("object"));

    let Some(Value::Object(properties)) = schema.get("properties") else {
        translated.insert("properties".to_string(), Value::Object(schema.clone()));
        return translated;
    };
    translated.insert("properties".to_string(), Value::Object(properties.clone()));

    if let Some(Value::Array(required)) = schema.get("required") {
        let required: Vec<Value> = required
            .iter()
            .filter(|item| item.is_string())
            .cloned()
            .collect();
        translated.insert("required".to_string(), Value::Array(required));
    }
    translated
}

/// Converts a tool result into protocol content.
#[must_use]
pub fn to_content(output: ToolOutput) -> Content {
    match output {
        ToolOutput::Text(text) => Content::text(text),
        ToolOutput::Structured(Value::String(text)) => Content::text(text),
        ToolOutput::Structured(value) => Content::text(value.to_string()),
        ToolOutput::Binary { data, mime_type } if mime_type.starts_with("image/") => {
            Content::image(BASE64.encode(data), mime_type)
        }
        ToolOutput::Binary { data, mime_type } => Content::text(format!(
            "Binary content ({mime_type}, {} bytes): {}",
            data.len(),
            BASE64.encode(&data)
        )),
    }
}
