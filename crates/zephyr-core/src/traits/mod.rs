//! Core traits for the Zephyr MCP server.
//!
//! # Module Structure
//!
//! - `tool` - The capability set every registered tool implements

mod tool;

pub use tool::McpTool;
