//! Tool execution for the reasoning loop.
//!
//! Every capability the model can call is a [`Tool`] implementor collected
//! into a [`ToolSet`], which dispatches by name under per-tool
//! [`ToolTimeouts`]. Whether a call is *allowed* is decided by the
//! [`budget`](crate::budget) module before the call reaches the set.

pub mod core;

pub use core::{
    DEFAULT_MAX_RESULT_BYTES, DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolFuture, ToolOutput,
    ToolSet, ToolTimeouts, log_tool_call, parse_tool_args, truncate_result,
    validate_tool_arguments,
};
