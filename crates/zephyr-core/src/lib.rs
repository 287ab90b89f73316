//! Core types, traits, and errors for the Zephyr MCP server.
//!
//! This crate provides the foundational types shared by every other crate
//! in the workspace.
//!
//! # Architecture
//!
//! The core consists of:
//! - Tool domain types (`ToolDescriptor`, `ToolOutput`, `Arguments`)
//! - The registry capability trait (`traits::McpTool`)
//! - Error hierarchy with contextual information
//! - Layered configuration (`Config`)
//! - CLI value types (`cli`)

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod error;
mod types;

pub mod cli;
pub mod config;
pub mod traits;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{Arguments, JsonObject, ToolDescriptor, ToolOutput};
