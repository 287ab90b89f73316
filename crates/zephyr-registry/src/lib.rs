//! Tool registry for the Zephyr MCP server.
//!
//! The registry maps unique tool names to live [`McpTool`] handles and is
//! the only place that mapping is held. The plugin manager populates it;
//! the dispatch layer reads it on every call.
//!
//! [`McpTool`]: zephyr_core::traits::McpTool

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod discovery;
mod registry;

pub use discovery::ToolDiscovery;
pub use registry::ToolRegistry;
