//! Convenience re-exports for the common path.
//!
//! ```ignore
//! use redline_rs::prelude::*;
//! ```

pub use crate::agent::{
    CompositeEventHandler, EventHandler, EventResponse, FnEventHandler, Harness, HarnessConfig,
    HarnessEvent, HarnessResult, LoggingHandler, NoopHandler, ReasoningContext, Summary,
    Termination, summarize,
};
pub use crate::budget::{
    BudgetRun, Capability, CatalogTool, FindingClassifier, FindingSummary, Route,
    RoutingDecision, Scope, Severity, ToolCallRecord, ToolCatalog, ToolResultLedger,
    UsageLimits, UsageSnapshot, UsageTracker,
};
pub use crate::tools::{
    FnTool, Tool, ToolFuture, ToolOutput, ToolSet, ToolTimeouts, parse_tool_args,
};
pub use crate::{ChatBackend, Message, OpenRouterClient, ToolCall, ToolDef, json_schema_for};
