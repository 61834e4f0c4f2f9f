//! Events, handlers, and run results for the [`Harness`](super::harness::Harness).
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::Message;
use crate::budget::{Route, SkipReason, ToolResultLedger, UsageSnapshot, UsageTracker};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum HarnessEvent<'a> {
    /// A reasoning turn is starting.
    RoundStart {
        round: u32,
        max_rounds: u32,
        usage: &'a UsageSnapshot,
    },
    /// The model returned text (may be alongside tool calls).
    Text(&'a str),
    /// The router chose the next edge after a turn.
    Routed {
        round: u32,
        route: Route,
        node: &'a str,
    },
    /// The model requested tool calls this turn.
    ToolCallsReceived { round: u32, count: usize },
    /// A requested call was refused for lack of budget and will not run.
    ToolSkipped {
        name: &'a str,
        call_id: &'a str,
        reason: SkipReason,
    },
    /// A requested tool is not in the catalog; it is forwarded anyway.
    UnknownTool { name: &'a str, call_id: &'a str },
    /// A single tool is about to run. Handlers may answer
    /// [`EventResponse::Deny`] to veto it.
    ToolExecuting { name: &'a str, arguments: &'a str },
    /// A single tool finished (or failed, or timed out).
    ToolResult {
        name: &'a str,
        call_id: &'a str,
        success: bool,
        result: &'a str,
    },
    /// New tool results were merged into the ledger.
    LedgerMerged {
        accepted: usize,
        duplicates: usize,
        global_count: u32,
    },
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// The router reached its terminal state.
    Terminal { rounds_used: u32 },
    /// The reasoning-turn cap was hit before the router terminated.
    RoundLimitReached { max_rounds: u32 },
    /// The run was cancelled from outside.
    Cancelled { round: u32 },
}

impl HarnessEvent<'_> {
    /// Total tokens for `TokenUsage` events.
    pub fn total_tokens(&self) -> Option<u64> {
        if let HarnessEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
        } = self
        {
            Some(u64::from(*prompt_tokens) + u64::from(*completion_tokens))
        } else {
            None
        }
    }
}

/// Feedback from a handler. Only [`HarnessEvent::ToolExecuting`] reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventResponse {
    /// Do not run the tool. The reason becomes the failed result; the call
    /// still consumes budget like any other failure.
    Deny(String),
}

/// Observer for harness events.
///
/// ```ignore
/// struct PrintText;
///
/// impl EventHandler for PrintText {
///     fn on_event(&self, event: &HarnessEvent<'_>) -> Option<EventResponse> {
///         if let HarnessEvent::Text(text) = event {
///             println!("{text}");
///         }
///         None
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &HarnessEvent<'_>) -> Option<EventResponse> {
        let _ = event;
        None
    }
}

pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&HarnessEvent<'_>) -> Option<EventResponse> + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&HarnessEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&HarnessEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    fn on_event(&self, event: &HarnessEvent<'_>) -> Option<EventResponse> {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in order and returns the
/// first non-`None` response.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(audit, AuditTrail::new(path));
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &HarnessEvent<'_>) -> Option<EventResponse> {
        let mut first = None;
        for handler in &self.handlers {
            let response = handler.on_event(event);
            if first.is_none() {
                first = response;
            }
        }
        first
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &HarnessEvent<'_>) -> Option<EventResponse> {
        match event {
            HarnessEvent::RoundStart {
                round,
                max_rounds,
                usage,
            } => {
                info!(
                    "[round {round}/{max_rounds}] calls {}/{}",
                    usage.global_count, usage.global_limit
                );
            }
            HarnessEvent::Text(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM text: {preview}{}",
                    if text.chars().nth(200).is_some() { "..." } else { "" }
                );
            }
            HarnessEvent::Routed { round, route, node } => {
                debug!("Round {round} routed to {route} ({node})");
            }
            HarnessEvent::ToolCallsReceived { round, count } => {
                debug!("{count} tool call(s) in round {round}");
            }
            HarnessEvent::ToolSkipped {
                name,
                call_id,
                reason,
            } => {
                warn!("Skipped {name} ({call_id}): {reason}");
            }
            HarnessEvent::UnknownTool { name, call_id } => {
                warn!("Model requested unknown tool {name} ({call_id})");
            }
            HarnessEvent::ToolExecuting { name, .. } => {
                debug!("Executing tool: {name}");
            }
            HarnessEvent::ToolResult {
                name,
                success,
                result,
                ..
            } => {
                debug!("Tool {name} result: success={success}, {} bytes", result.len());
            }
            HarnessEvent::LedgerMerged {
                accepted,
                duplicates,
                global_count,
            } => {
                debug!(
                    "Ledger merged {accepted} result(s), {duplicates} duplicate(s); {global_count} call(s) so far"
                );
            }
            HarnessEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            HarnessEvent::Terminal { rounds_used } => {
                info!("Budget router terminated after {rounds_used} round(s)");
            }
            HarnessEvent::RoundLimitReached { max_rounds } => {
                info!("Agent hit round limit ({max_rounds})");
            }
            HarnessEvent::Cancelled { round } => {
                warn!("Run cancelled during round {round}");
            }
        }
        None
    }
}

// ── Run result ─────────────────────────────────────────────────────

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The router reached [`Route::Terminal`].
    Terminal,
    /// `max_rounds` reasoning turns were used.
    RoundLimit,
    /// The cancellation token fired.
    Cancelled,
}

/// Outcome of [`Harness::run()`](super::harness::Harness::run). Cancelled
/// runs still carry the ledger accumulated up to that point.
#[derive(Debug)]
pub struct HarnessResult {
    pub trace_id: String,
    /// Every turn of the run, in order.
    pub transcript: Vec<Message>,
    pub ledger: ToolResultLedger,
    pub usage: UsageTracker,
    /// Reasoning turns executed.
    pub rounds_used: u32,
    pub termination: Termination,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HarnessResult {
    pub fn cancelled(&self) -> bool {
        self.termination == Termination::Cancelled
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens.saturating_add(self.total_completion_tokens)
    }

    /// Assistant text across all turns.
    pub fn text(&self) -> String {
        self.transcript
            .iter()
            .filter(|m| m.role == crate::MessageRole::Assistant)
            .filter_map(|m| m.content.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
