//! The edge taken after every reasoning turn.

use super::catalog::{Scope, ToolCatalog};
use super::usage::UsageTracker;
use crate::{Message, ToolCall};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_REASONING_NODE: &str = "reasoning";
pub const DEFAULT_TOOLS_NODE: &str = "tools";
pub const DEFAULT_END_NODE: &str = "end";

/// Where a run goes next. Also the state the run is in: it starts in
/// `Reasoning` and `Terminal` is absorbing.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Reasoning,
    Tools,
    Terminal,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Reasoning => write!(f, "reasoning"),
            Route::Tools => write!(f, "tools"),
            Route::Terminal => write!(f, "terminal"),
        }
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The tool has no per-tool budget left, counting earlier calls in the batch.
    ToolExhausted,
    /// The batch already uses all remaining global budget.
    GlobalExhausted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ToolExhausted => write!(f, "tool call limit reached"),
            SkipReason::GlobalExhausted => write!(f, "global call limit reached"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkippedCall {
    pub call: ToolCall,
    pub reason: SkipReason,
}

/// A batch of requested calls split into the ones to execute and the ones
/// refused for lack of budget.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Admission {
    pub admitted: Vec<ToolCall>,
    pub skipped: Vec<SkippedCall>,
}

/// Routing state machine configured by the node names it routes to and the
/// capability scope it budgets against.
///
/// Evaluation order after each reasoning turn, first match wins:
///
/// 1. global budget exhausted: [`Route::Terminal`]
/// 2. the turn requests at least one admissible call: [`Route::Tools`]
/// 3. some in-scope tool still has budget: [`Route::Reasoning`]
/// 4. otherwise: [`Route::Terminal`]
///
/// A requested call is admissible when its tool is outside the catalog
/// (it is forwarded to execution, which decides) or when the tool still has
/// per-tool budget. Admissions never exceed the remaining global budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    end_node: String,
    tools_node: String,
    reasoning_node: String,
    scope: Scope,
}

impl RoutingDecision {
    pub fn new(
        end_node: impl Into<String>,
        tools_node: impl Into<String>,
        scope: impl Into<Scope>,
    ) -> Self {
        Self {
            end_node: end_node.into(),
            tools_node: tools_node.into(),
            reasoning_node: DEFAULT_REASONING_NODE.to_string(),
            scope: scope.into(),
        }
    }

    /// Router with the default node names.
    pub fn scoped(scope: impl Into<Scope>) -> Self {
        Self::new(DEFAULT_END_NODE, DEFAULT_TOOLS_NODE, scope)
    }

    pub fn with_reasoning_node(mut self, node: impl Into<String>) -> Self {
        self.reasoning_node = node.into();
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn end_node(&self) -> &str {
        &self.end_node
    }

    pub fn tools_node(&self) -> &str {
        &self.tools_node
    }

    pub fn reasoning_node(&self) -> &str {
        &self.reasoning_node
    }

    /// Split `calls` into admitted and skipped, in request order.
    pub fn admit(
        &self,
        calls: &[ToolCall],
        usage: &UsageTracker,
        catalog: &ToolCatalog,
    ) -> Admission {
        let global_left = usage.global_remaining() as usize;
        let mut in_batch: HashMap<&str, u32> = HashMap::new();
        let mut admission = Admission::default();

        for call in calls {
            let name = call.function.name.as_str();
            let reason = if admission.admitted.len() >= global_left {
                Some(SkipReason::GlobalExhausted)
            } else if catalog.contains(name) {
                let pending = in_batch.get(name).copied().unwrap_or(0);
                (usage.remaining(name) <= pending).then_some(SkipReason::ToolExhausted)
            } else {
                None
            };

            match reason {
                Some(reason) => admission.skipped.push(SkippedCall {
                    call: call.clone(),
                    reason,
                }),
                None => {
                    *in_batch.entry(name).or_insert(0) += 1;
                    admission.admitted.push(call.clone());
                }
            }
        }
        admission
    }

    /// Choose the next route given the latest turn and the current budget.
    pub fn decide(
        &self,
        last_turn: Option<&Message>,
        usage: &UsageTracker,
        catalog: &ToolCatalog,
    ) -> Route {
        let route = self.evaluate(last_turn, usage, catalog);
        info!(
            route = %route,
            scope = %self.scope,
            global = usage.counters().global(),
            global_limit = usage.limits().global_limit(),
            "Routing decision"
        );
        route
    }

    fn evaluate(
        &self,
        last_turn: Option<&Message>,
        usage: &UsageTracker,
        catalog: &ToolCatalog,
    ) -> Route {
        if usage.is_global_exhausted() {
            return Route::Terminal;
        }

        let requested = last_turn.map(Message::requested_calls).unwrap_or(&[]);
        if !requested.is_empty() {
            for call in requested.iter().filter(|c| !catalog.contains(&c.function.name)) {
                warn!(
                    tool = %call.function.name,
                    call_id = %call.id,
                    "Requested tool is not in the catalog; forwarding without a per-tool budget"
                );
            }
            let admission = self.admit(requested, usage, catalog);
            if !admission.admitted.is_empty() {
                return Route::Tools;
            }
            debug!(
                requested = requested.len(),
                "No requested call has budget left"
            );
        }

        if !usage.all_exhausted(catalog.names_in_scope(self.scope)) {
            Route::Reasoning
        } else {
            Route::Terminal
        }
    }

    /// Configured node name for `route`.
    pub fn node_for(&self, route: Route) -> &str {
        match route {
            Route::Reasoning => &self.reasoning_node,
            Route::Tools => &self.tools_node,
            Route::Terminal => &self.end_node,
        }
    }

    /// [`decide`](Self::decide) mapped onto the configured node names.
    pub fn next_node(
        &self,
        last_turn: Option<&Message>,
        usage: &UsageTracker,
        catalog: &ToolCatalog,
    ) -> &str {
        self.node_for(self.decide(last_turn, usage, catalog))
    }
}
