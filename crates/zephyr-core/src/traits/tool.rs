//! Registry-facing tool trait.
//!
//! This module defines `McpTool`, the shape the tool registry stores. Builtin
//! tools can implement it directly; plugin capabilities are adapted into it
//! by the plugin crate.

use crate::{Arguments, JsonObject, Result, ToolDescriptor, ToolOutput};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A named, schema-described callable capability.
///
/// Implementations must be reentrant: the server does not serialize
/// concurrent calls to the same tool.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use zephyr_core::traits::McpTool;
/// use zephyr_core::{Arguments, Error, JsonObject, Result, ToolOutput};
///
/// struct Echo;
///
/// #[async_trait]
/// impl McpTool for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn version(&self) -> &str {
///         "1.0.0"
///     }
///
///     fn description(&self) -> &str {
///         "Returns the text argument"
///     }
///
///     fn input_schema(&self) -> JsonObject {
///         JsonObject::new()
///     }
///
///     async fn execute(&self, _ct: CancellationToken, args: Arguments) -> Result<ToolOutput> {
///         args.get("text")
///             .and_then(|v| v.as_str())
///             .map(ToolOutput::text)
///             .ok_or_else(|| Error::execution("echo", "text is required"))
///     }
/// }
/// ```
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Tool version.
    fn version(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Declared input schema.
    fn input_schema(&self) -> JsonObject;

    /// Descriptor exposed to protocol callers.
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.input_schema())
    }

    /// Called once by the registry before the tool becomes visible.
    ///
    /// # Errors
    ///
    /// A failure keeps the tool out of the registry.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Runs the tool with the caller's arguments.
    ///
    /// Long-running tools should stop when `ct` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the call failed; the dispatch layer
    /// turns it into a protocol error result.
    async fn execute(&self, ct: CancellationToken, args: Arguments) -> Result<ToolOutput>;

    /// Called once when the tool leaves the registry.
    ///
    /// # Errors
    ///
    /// Failures are logged by the registry; removal happens regardless.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
