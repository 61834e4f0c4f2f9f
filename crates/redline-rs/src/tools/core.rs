//! Tool abstraction and dispatch.
//!
//! The [`Tool`] trait defines what every tool provides: a static API
//! definition (name, description, JSON schema) and an async `execute`
//! returning a [`ToolOutput`]. Tools are collected into a [`ToolSet`], which
//! handles dispatch, per-tool timeouts, validation and truncation.
//!
//! Execution never fails with `Err`: an unknown tool, invalid arguments or a
//! timeout all come back as a failed [`ToolOutput`] so every requested call
//! gets a result turn.

use crate::ToolDef;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Maximum size (in bytes) for a tool payload before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Timeout for tools without an explicit entry (5 minutes).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolOutput> + Send + 'a>>;

// ── ToolOutput ─────────────────────────────────────────────────────

/// Terminal result of one tool invocation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(payload: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: payload.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: String::new(),
            error: Some(error.into()),
        }
    }

    /// A failure that still produced output worth showing the model.
    pub fn failed_with_payload(error: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::failed(error)
        }
    }

    /// Content of the tool-result turn. Failures start with `Error:`.
    pub fn to_content(&self) -> String {
        if self.success {
            return self.payload.clone();
        }
        let error = self.error.as_deref().unwrap_or("tool failed");
        if self.payload.is_empty() {
            format!("Error: {error}")
        } else {
            format!("Error: {error}\n{}", self.payload)
        }
    }

    fn truncated(mut self, max: usize) -> Self {
        self.payload = truncate_result(self.payload, max);
        self
    }
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool the model can invoke via function-calling.
///
/// # Example
///
/// ```ignore
/// struct Probe { client: reqwest::Client }
///
/// impl Tool for Probe {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, arguments: &str) -> ToolFuture<'_> {
///         let arguments = arguments.to_string();
///         Box::pin(async move {
///             let args: ProbeArgs = match parse_tool_args(&arguments) {
///                 Ok(a) => a,
///                 Err(e) => return ToolOutput::failed(e),
///             };
///             // ...
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the API.
    fn definition(&self) -> ToolDef;

    /// Run the tool with the raw JSON arguments string.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolTimeouts ───────────────────────────────────────────────────

/// Per-tool execution deadlines with a shared default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolTimeouts {
    default: Duration,
    per_tool: HashMap<String, Duration>,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl ToolTimeouts {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            per_tool: HashMap::new(),
        }
    }

    pub fn with_tool_timeout(mut self, tool: impl Into<String>, timeout: Duration) -> Self {
        self.per_tool.insert(tool.into(), timeout);
        self
    }

    pub fn timeout_for(&self, tool: &str) -> Duration {
        self.per_tool.get(tool).copied().unwrap_or(self.default)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// Tools dispatched by name.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_max_result_bytes(15_000)
///     .with_timeouts(ToolTimeouts::new(Duration::from_secs(120))
///         .with_tool_timeout("nmap_port_scan", Duration::from_secs(600)))
///     .with(CurlTool::new())
///     .with_if(nmap_installed, NmapTool::new());
/// ```
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    timeouts: ToolTimeouts,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("max_result_bytes", &self.max_result_bytes)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: false,
            timeouts: ToolTimeouts::default(),
        }
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register `tool` only when `condition` holds.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// All definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Definitions for `names`, in that order. Names without a registered
    /// tool are skipped.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDef> {
        names
            .iter()
            .filter_map(|n| self.tools.get(*n))
            .map(|t| t.definition())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn timeouts(&self) -> &ToolTimeouts {
        &self.timeouts
    }

    /// Execute a call by name under that tool's timeout. Always returns a
    /// terminal output.
    pub async fn execute(&self, name: &str, arguments: &str) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Execution requested for unregistered tool");
            return ToolOutput::failed(format!("unknown tool '{name}'"));
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return ToolOutput::failed(error);
        }

        log_tool_call(name, arguments);
        let limit = self.timeouts.timeout_for(name);
        let start = Instant::now();

        let output = match tokio::time::timeout(limit, tool.execute(arguments)).await {
            Ok(output) => output,
            Err(_) => {
                info!(
                    "Tool {name} timed out after {:.1}s (limit: {}s)",
                    start.elapsed().as_secs_f64(),
                    limit.as_secs(),
                );
                ToolOutput::failed(format!(
                    "tool '{name}' timed out after {} seconds",
                    limit.as_secs()
                ))
            }
        };

        debug!(
            "Tool {name} finished in {:.0}ms (success: {}, {} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            output.success,
            output.payload.len()
        );
        trace!(
            "Tool {name} payload preview: {}",
            output.payload.chars().take(300).collect::<String>()
        );

        output.truncated(self.max_result_bytes)
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ─────────────────────────────────────────────────────────

type ErasedToolHandler =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = ToolOutput> + Send>> + Send + Sync>;

/// A closure-based tool that parses its arguments into `A` before calling
/// the handler. Parse failures become failed outputs.
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutput> + Send + 'static,
    {
        let erased = move |raw: String| -> Pin<Box<dyn Future<Output = ToolOutput> + Send>> {
            match parse_tool_args::<A>(&raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => Box::pin(async move { ToolOutput::failed(e) }),
            }
        };
        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        (self.handler)(arguments.to_string())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate arguments against the tool's declared JSON Schema.
///
/// Returns `None` if valid, or a message the model can act on.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "invalid JSON arguments for tool '{}': {e}",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;
    // An invalid schema skips validation.
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return None;
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{}':\n{}",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO with a short argument preview.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().nth(120).is_some() { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Cut `s` to at most `max` bytes on a char boundary, appending a notice.
pub fn truncate_result(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let total = s.len();
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str(&format!("...\n[truncated: {total} bytes total]"));
    s
}

/// Parse raw JSON arguments into a typed struct, with an error message
/// suited to a failed [`ToolOutput`].
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "invalid tool arguments: {e}. \
             Provide valid JSON matching the tool's parameter schema."
        )
    })
}
