//! Tool-call budgeting and routing.
//!
//! A run owns one [`BudgetRun`], which bundles the pieces that decide what
//! happens after each reasoning turn:
//!
//! - [`ToolCatalog`]: the tools the run may call, tagged by [`Capability`]
//! - [`UsageTracker`]: per-tool and global counters against [`UsageLimits`]
//! - [`TranscriptScanner`]: finds tool results the ledger has not seen yet
//! - [`ToolResultLedger`]: deduplicates results by call id and feeds the tracker
//! - [`RoutingDecision`]: picks [`Route::Tools`], [`Route::Reasoning`] or
//!   [`Route::Terminal`]
//!
//! ```
//! use redline_rs::budget::*;
//! use redline_rs::{Message, ToolCall};
//!
//! let catalog = ToolCatalog::new(vec![
//!     CatalogTool::new("curl_tool", [Capability::Scan], "HTTP probe"),
//! ]).unwrap();
//! let limits = UsageLimits::new(10).with_tool_limit("curl_tool", 1);
//! let router = RoutingDecision::scoped(Capability::Scan);
//! let mut run = BudgetRun::new(&catalog, limits, router).unwrap();
//!
//! let mut transcript = vec![
//!     Message::assistant_tool_calls(vec![ToolCall::new("c1", "curl_tool", "{}")]),
//! ];
//! assert_eq!(run.route(&transcript), Route::Tools);
//!
//! transcript.push(Message::tool_result("c1", "HTTP/1.1 200 OK"));
//! let merged = run.observe(&transcript);
//! assert_eq!(merged.accepted, vec!["c1"]);
//!
//! transcript.push(Message::assistant_text("done"));
//! assert_eq!(run.route(&transcript), Route::Terminal);
//! ```

pub mod catalog;
pub mod ledger;
pub mod routing;
pub mod scanner;
pub mod usage;

pub use catalog::{Capability, CatalogTool, Scope, ToolCatalog};
pub use ledger::{
    FindingClassifier, FindingSummary, MergeReport, Severity, ToolCallRecord, ToolResultLedger,
};
pub use routing::{Admission, Route, RoutingDecision, SkipReason, SkippedCall};
pub use scanner::TranscriptScanner;
pub use usage::{
    DEFAULT_TOOL_LIMIT, ToolUsage, UsageCounters, UsageLimits, UsageSnapshot, UsageTracker,
};

use crate::{Message, MessageRole, ToolCall};
use tracing::debug;

/// Budget state of a single run.
///
/// Never shared between runs: a scan phase and a later attack phase each
/// build their own. Once [`route`](Self::route) returns [`Route::Terminal`]
/// every later call returns it too.
pub struct BudgetRun<'c> {
    catalog: &'c ToolCatalog,
    usage: UsageTracker,
    ledger: ToolResultLedger,
    router: RoutingDecision,
    scanner: TranscriptScanner<'c>,
    state: Route,
}

impl<'c> BudgetRun<'c> {
    /// Fails when `limits` names a tool the catalog does not contain.
    pub fn new(
        catalog: &'c ToolCatalog,
        limits: UsageLimits,
        router: RoutingDecision,
    ) -> Result<Self, String> {
        limits.validate_against(catalog)?;
        Ok(Self {
            catalog,
            usage: UsageTracker::new(limits),
            ledger: ToolResultLedger::new(),
            router,
            scanner: TranscriptScanner::new(),
            state: Route::Reasoning,
        })
    }

    pub fn with_classifier(mut self, classifier: &'c dyn FindingClassifier) -> Self {
        self.scanner = self.scanner.with_classifier(classifier);
        self
    }

    /// Scan `transcript` for unseen tool results and merge them.
    ///
    /// Safe to call any number of times on the same transcript; results
    /// already in the ledger are never counted again.
    pub fn observe(&mut self, transcript: &[Message]) -> MergeReport {
        let records = self.scanner.scan(transcript, self.ledger.seen_call_ids());
        let report = self.ledger.merge(records, &mut self.usage, self.catalog);
        if !report.is_empty() {
            debug!(
                accepted = report.accepted.len(),
                global = self.usage.counters().global(),
                "Ledger updated"
            );
        }
        report
    }

    /// Route on the final turn of `transcript`. Only an assistant turn can
    /// request tools; any other final turn is treated as a turn without requests.
    pub fn route(&mut self, transcript: &[Message]) -> Route {
        if self.state == Route::Terminal {
            return Route::Terminal;
        }
        let last = transcript
            .last()
            .filter(|m| m.role == MessageRole::Assistant);
        self.state = self.router.decide(last, &self.usage, self.catalog);
        self.state
    }

    /// [`observe`](Self::observe) followed by [`route`](Self::route).
    pub fn step(&mut self, transcript: &[Message]) -> (MergeReport, Route) {
        let report = self.observe(transcript);
        (report, self.route(transcript))
    }

    /// Which of `calls` the current budget lets through.
    pub fn admit(&self, calls: &[ToolCall]) -> Admission {
        self.router.admit(calls, &self.usage, self.catalog)
    }

    /// Force the run into [`Route::Terminal`].
    pub fn terminate(&mut self) {
        self.state = Route::Terminal;
    }

    pub fn state(&self) -> Route {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == Route::Terminal
    }

    /// Catalog names matching the router's scope.
    pub fn tools_in_scope(&self) -> Vec<&'c str> {
        self.catalog.names_in_scope(self.router.scope())
    }

    /// Usage of the in-scope tools plus anything already called.
    pub fn snapshot(&self) -> UsageSnapshot {
        self.usage.snapshot(self.tools_in_scope())
    }

    pub fn catalog(&self) -> &'c ToolCatalog {
        self.catalog
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn ledger(&self) -> &ToolResultLedger {
        &self.ledger
    }

    pub fn router(&self) -> &RoutingDecision {
        &self.router
    }

    pub fn into_parts(self) -> (ToolResultLedger, UsageTracker) {
        (self.ledger, self.usage)
    }
}
