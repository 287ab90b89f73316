//! Compile-time checks that shared types can cross task boundaries.

use std::sync::Arc;
use zephyr_core::traits::McpTool;
use zephyr_core::{Config, Error, ToolDescriptor, ToolOutput};

const fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_core_types_are_send_sync() {
    assert_send_sync::<Error>();
    assert_send_sync::<Config>();
    assert_send_sync::<ToolDescriptor>();
    assert_send_sync::<ToolOutput>();
}

#[test]
fn test_tool_handles_are_send_sync() {
    assert_send_sync::<Arc<dyn McpTool>>();
}
