//! Transport adapters for the Zephyr MCP server.
//!
//! Each adapter terminates one wire protocol and hands decoded sessions to
//! an `rmcp` server handler:
//!
//! - `stdio` - one session over a byte stream (stdin/stdout by default)
//! - `sse` - event stream on `/sse`, message submission on `/message`
//! - `http` - streamable HTTP on `/mcp`
//!
//! All three share the [`TransportAdapter`] control interface; build them
//! through [`TransportFactory`].

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod adapter;
mod error;
mod factory;
mod http;
mod options;
mod sse;
mod stdio;

pub use adapter::{SHUTDOWN_GRACE, TransportAdapter};
pub use error::{Result, TransportError};
pub use factory::{SUPPORTED_PROTOCOLS, TransportFactory};
pub use http::{HttpAdapter, MCP_PATH};
pub use options::{
    DEFAULT_BUFFER_SIZE, DEFAULT_HOST, DEFAULT_HTTP_PORT, DEFAULT_HTTP_TIMEOUT, DEFAULT_KEEP_ALIVE,
    DEFAULT_SSE_PORT, HttpOptions, SseOptions, StdioOptions, TransportConfig,
};
pub use sse::{MESSAGE_PATH, SSE_PATH, SseAdapter};
pub use stdio::{BoxedReader, BoxedWriter, StdioAdapter, StreamFactory};
