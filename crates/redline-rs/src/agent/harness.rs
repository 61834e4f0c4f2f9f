//! The budgeted ReAct loop.
//!
//! Each round renders a [`ReasoningContext`] from the run's budget state,
//! asks the model for one assistant turn, and lets the
//! [`BudgetRun`](crate::budget::BudgetRun) pick the next edge:
//!
//! - [`Route::Tools`]: run the admitted calls, append their result turns,
//!   merge the new results into the ledger, then re-route
//! - [`Route::Reasoning`]: next round
//! - [`Route::Terminal`]: stop
//!
//! `max_rounds` caps reasoning turns regardless of budgets.

use super::config::HarnessConfig;
use super::events::{EventHandler, HarnessEvent, HarnessResult, NoopHandler, Termination};
use super::execution::{execute_tool_calls, send_reasoning_request};
use crate::api::tracing::{CostTracker, generate_trace_id, pricing_for_model};
use crate::budget::{BudgetRun, Route, ToolResultLedger};
use crate::tools::core::ToolSet;
use crate::{ChatBackend, Message};
use std::collections::HashSet;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Reasoning context ──────────────────────────────────────────────

/// Default system prompt layout. Placeholders are replaced on every round.
pub const DEFAULT_CONTEXT_TEMPLATE: &str = "\
{behavior}

<TOOLS>
{tools}
</TOOLS>

<TOOLS_USAGE>
{usage}
</TOOLS_USAGE>

<CALLING_LIMITS>
{limits}
</CALLING_LIMITS>

<PREVIOUS_RESULTS>
{results}
</PREVIOUS_RESULTS>
";

/// What the model sees each round: a system message rendered from the
/// template and the budget state, followed by the task as a user message.
///
/// Supported placeholders: `{behavior}`, `{task}`, `{tools}`, `{usage}`,
/// `{limits}`, `{results}`.
#[derive(Debug, Clone)]
pub struct ReasoningContext {
    behavior: String,
    task: String,
    template: String,
}

impl ReasoningContext {
    pub fn new(behavior: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            behavior: behavior.into(),
            task: task.into(),
            template: DEFAULT_CONTEXT_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn behavior(&self) -> &str {
        &self.behavior
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Fill the template from the current state of `budget`.
    pub fn render(&self, budget: &BudgetRun<'_>) -> String {
        let scope = budget.router().scope();
        let tools: Vec<_> = budget
            .catalog()
            .iter()
            .filter(|t| scope.matches(&t.capabilities))
            .collect();
        let limits = budget.usage().limits();
        let limits = serde_json::json!({
            "global_limit": limits.global_limit(),
            "default_limit": limits.default_limit(),
            "per_tool": limits.per_tool(),
        });

        self.template
            .replace("{behavior}", &self.behavior)
            .replace("{task}", &self.task)
            .replace("{tools}", &pretty(&tools))
            .replace("{usage}", &pretty(&budget.snapshot()))
            .replace("{limits}", &pretty(&limits))
            .replace("{results}", &pretty(&budget.ledger().to_json()))
    }

    fn messages(&self, budget: &BudgetRun<'_>) -> Vec<Message> {
        vec![Message::system(self.render(budget)), Message::user(&self.task)]
    }
}

/// Rewrite call ids the ledger has already seen, or that repeat within the
/// turn. Providers that number ids per response reuse them across rounds,
/// and a reused id would execute without ever being merged or counted.
fn unique_call_ids(turn: &mut Message, seen: &ToolResultLedger, round: u32) {
    let Some(calls) = turn.tool_calls.as_mut() else {
        return;
    };
    let mut batch = HashSet::new();
    for call in calls.iter_mut() {
        if seen.contains(&call.id) || batch.contains(&call.id) {
            let base = format!("{}#r{round}", call.id);
            let mut id = base.clone();
            let mut n = 1;
            while seen.contains(&id) || batch.contains(&id) {
                id = format!("{base}.{n}");
                n += 1;
            }
            debug!(from = %call.id, to = %id, "Reassigned reused tool call id");
            call.id = id;
        }
        batch.insert(call.id.clone());
    }
}

fn pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

// ── Harness ────────────────────────────────────────────────────────

/// Drives one [`BudgetRun`] to completion.
///
/// ```ignore
/// let result = Harness::new(&client, &tools, HarnessConfig::new("openai/gpt-4.1"))
///     .with_event_handler(&LoggingHandler)
///     .with_cancellation(token.clone())
///     .run(context, budget)
///     .await?;
/// ```
pub struct Harness<'a> {
    backend: &'a dyn ChatBackend,
    tools: &'a ToolSet,
    config: HarnessConfig,
    event_handler: &'a dyn EventHandler,
    cancel: CancellationToken,
}

impl<'a> Harness<'a> {
    pub fn new(backend: &'a dyn ChatBackend, tools: &'a ToolSet, config: HarnessConfig) -> Self {
        Self {
            backend,
            tools,
            config,
            event_handler: &NoopHandler,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Abort the run when `token` is cancelled. Checked before each round and
    /// raced against the model call and the tool batch.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the loop until the router terminates, the round cap is hit, or the
    /// run is cancelled. Only model-call failures are returned as `Err`.
    pub async fn run(
        &self,
        context: ReasoningContext,
        mut budget: BudgetRun<'_>,
    ) -> Result<HarnessResult, String> {
        let trace_id = generate_trace_id();
        let started_at = Utc::now();
        let pricing = pricing_for_model(&self.config.model);
        let mut cost = CostTracker::new();
        let handler = self.event_handler;
        let max_rounds = self.config.max_rounds;

        info!(
            trace_id = %trace_id,
            model = %self.config.model,
            scope = %budget.router().scope(),
            max_rounds,
            "Starting run"
        );

        let mut transcript = vec![
            Message::system(context.behavior()),
            Message::user(context.task()),
        ];
        let mut rounds_used = 0;

        let termination = loop {
            if self.cancel.is_cancelled() {
                handler.on_event(&HarnessEvent::Cancelled { round: rounds_used });
                break Termination::Cancelled;
            }
            if rounds_used >= max_rounds {
                handler.on_event(&HarnessEvent::RoundLimitReached { max_rounds });
                break Termination::RoundLimit;
            }
            rounds_used += 1;
            let round = rounds_used;

            let snapshot = budget.snapshot();
            handler.on_event(&HarnessEvent::RoundStart {
                round,
                max_rounds,
                usage: &snapshot,
            });

            // ── Send request ──
            let tool_defs = self.tools.definitions_for(&budget.tools_in_scope());
            let request = send_reasoning_request(
                &self.config,
                self.backend,
                context.messages(&budget),
                tool_defs,
            );
            let completion = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = request => Some(result?),
            };
            let Some(completion) = completion else {
                handler.on_event(&HarnessEvent::Cancelled { round });
                break Termination::Cancelled;
            };

            if let Some(usage) = &completion.usage {
                let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
                let completion_tokens = usage.completion_tokens.unwrap_or(0);
                cost.record(prompt_tokens, completion_tokens, &pricing);
                handler.on_event(&HarnessEvent::TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                });
            }

            let mut turn = completion.into_message();
            unique_call_ids(&mut turn, budget.ledger(), round);
            if let Some(text) = turn.content.as_deref() {
                handler.on_event(&HarnessEvent::Text(text));
            }
            transcript.push(turn);

            let route = budget.route(&transcript);
            handler.on_event(&HarnessEvent::Routed {
                round,
                route,
                node: budget.router().node_for(route),
            });

            match route {
                Route::Reasoning => continue,
                Route::Terminal => {
                    handler.on_event(&HarnessEvent::Terminal { rounds_used });
                    break Termination::Terminal;
                }
                Route::Tools => {}
            }

            // ── Execute tool calls ──
            let calls = transcript
                .last()
                .map(|m| m.requested_calls().to_vec())
                .unwrap_or_default();
            handler.on_event(&HarnessEvent::ToolCallsReceived {
                round,
                count: calls.len(),
            });
            for call in calls
                .iter()
                .filter(|c| !budget.catalog().contains(&c.function.name))
            {
                handler.on_event(&HarnessEvent::UnknownTool {
                    name: &call.function.name,
                    call_id: &call.id,
                });
            }

            let admission = budget.admit(&calls);
            for skipped in &admission.skipped {
                warn!(
                    tool = %skipped.call.function.name,
                    call_id = %skipped.call.id,
                    "Not executing tool call: {}",
                    skipped.reason
                );
                handler.on_event(&HarnessEvent::ToolSkipped {
                    name: &skipped.call.function.name,
                    call_id: &skipped.call.id,
                    reason: skipped.reason,
                });
            }

            let outcome = execute_tool_calls(
                self.tools,
                &admission.admitted,
                self.config.max_parallel_tools,
                handler,
                &self.cancel,
            )
            .await;
            transcript.extend(outcome.results);

            let report = budget.observe(&transcript);
            handler.on_event(&HarnessEvent::LedgerMerged {
                accepted: report.accepted.len(),
                duplicates: report.duplicates,
                global_count: budget.usage().counters().global(),
            });

            if outcome.cancelled {
                handler.on_event(&HarnessEvent::Cancelled { round });
                break Termination::Cancelled;
            }

            // The batch may have spent the last of the budget; no point
            // asking the model again if so.
            let route = budget.route(&transcript);
            if route == Route::Terminal {
                handler.on_event(&HarnessEvent::Routed {
                    round,
                    route,
                    node: budget.router().node_for(route),
                });
                handler.on_event(&HarnessEvent::Terminal { rounds_used });
                break Termination::Terminal;
            }
        };

        let finished_at = Utc::now();
        let (ledger, usage) = budget.into_parts();
        info!(
            trace_id = %trace_id,
            rounds_used,
            tool_calls = ledger.len(),
            termination = ?termination,
            "Run finished: {}",
            cost.summary()
        );

        Ok(HarnessResult {
            trace_id,
            transcript,
            ledger,
            usage,
            rounds_used,
            termination,
            total_prompt_tokens: cost.total_prompt_tokens,
            total_completion_tokens: cost.total_completion_tokens,
            estimated_cost_usd: cost.estimated_cost_usd,
            started_at,
            finished_at,
        })
    }
}
