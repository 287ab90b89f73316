//! Domain types shared by the registry, plugins and dispatch layer.
//!
//! - [`ToolDescriptor`] describes a callable capability to protocol callers
//! - [`ToolOutput`] is the tagged result every tool returns
//! - [`Arguments`] is the caller-supplied argument map

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON object, used for schemas and argument maps.
pub type JsonObject = serde_json::Map<String, Value>;

/// Arguments supplied by the caller of a tool.
pub type Arguments = JsonObject;

/// Immutable description of a tool.
///
/// # Examples
///
/// ```
/// use zephyr_core::ToolDescriptor;
/// use serde_json::json;
///
/// let schema = json!({
///     "properties": {"text": {"type": "string"}},
///     "required": ["text"]
/// });
/// let descriptor = ToolDescriptor::new(
///     "echo",
///     "Returns its input",
///     schema.as_object().cloned().unwrap_or_default(),
/// );
/// assert_eq!(descriptor.name(), "echo");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    #[serde(rename = "inputSchema", default)]
    input_schema: JsonObject,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonObject,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Tool name as exposed to callers.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &JsonObject {
        &self.input_schema
    }
}

/// Result of a tool invocation.
///
/// Tools say what kind of payload they produced, so the dispatch layer can
/// format it without inspecting the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Plain text, passed through unchanged.
    Text(String),
    /// Structured data, rendered as JSON.
    Structured(Value),
    /// Raw bytes with a MIME type.
    Binary {
        /// Payload bytes
        data: Vec<u8>,
        /// MIME type of the payload
        mime_type: String,
    },
}

impl ToolOutput {
    /// Text output.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Structured output.
    #[must_use]
    pub const fn structured(value: Value) -> Self {
        Self::Structured(value)
    }

    /// Binary output.
    #[must_use]
    pub fn binary(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Binary {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Returns the text payload, if this is text output.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}
