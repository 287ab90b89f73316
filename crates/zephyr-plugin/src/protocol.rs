//! Wire format spoken between the host and sidecar plugin processes.
//!
//! Every message is one JSON object on its own line. The host sends
//! requests; the sidecar answers each request that expects a reply with a
//! response carrying the same `id`.
//!
//! ```text
//! -> {"id":1,"method":"lookup","params":{"symbol":"ZephyrPlugin"}}
//! <- {"id":1,"result":{"kind":"tool","name":"echo",...}}
//! -> {"id":2,"method":"execute","params":{"arguments":{"text":"hi"}}}
//! <- {"id":2,"error":{"message":"text is required"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zephyr_core::{JsonObject, ToolDescriptor};

/// Resolve an exported symbol. Params: `{"symbol": ...}`.
pub const METHOD_LOOKUP: &str = "lookup";
/// Run the plugin's initialize hook.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Run the tool. Params: `{"arguments": {...}}`.
pub const METHOD_EXECUTE: &str = "execute";
/// Cancel an in-flight execute. Params: `{"id": ...}`. Never answered.
pub const METHOD_CANCEL: &str = "cancel";
/// Run the shutdown hook; the sidecar exits after answering.
pub const METHOD_SHUTDOWN: &str = "shutdown";

/// `kind` reported by a lookup that resolved to a tool capability.
pub const KIND_TOOL: &str = "tool";

/// Host-to-sidecar message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id
    pub id: u64,
    /// One of the `METHOD_*` names
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
}

/// Sidecar-to-host message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered
    pub id: u64,
    /// Success value or error
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Body of a [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Serialized as `"result": ...`
    Result(Value),
    /// Serialized as `"error": {"message": ...}`
    Error(RpcError),
}

/// Error payload of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Human-readable failure description
    pub message: String,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub const fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result),
        }
    }

    /// Failed response.
    #[must_use]
    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Error(RpcError {
                message: message.into(),
            }),
        }
    }

    /// Converts the outcome into a `Result` over the error message.
    ///
    /// # Errors
    ///
    /// Returns the remote message for [`Outcome::Error`].
    pub fn into_result(self) -> Result<Value, String> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(error.message),
        }
    }
}

/// Result of a successful `lookup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupReply {
    /// [`KIND_TOOL`] for a capability; anything else is a foreign export
    pub kind: String,
    /// Tool name
    #[serde(default)]
    pub name: String,
    /// Tool version
    #[serde(default)]
    pub version: String,
    /// Tool description
    #[serde(default)]
    pub description: String,
    /// Declared input schema
    #[serde(default)]
    pub input_schema: JsonObject,
    /// Descriptor, when it differs from the one derived from the fields above
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<ToolDescriptor>,
}
