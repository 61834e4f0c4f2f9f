//! Scan → attack → report.
//!
//! Each phase is one [`Harness`] run over its own [`BudgetRun`], followed by
//! one structured summary of that phase's ledger. The scan summary seeds
//! the attack phase; both feed the final [`AssessmentReport`].
//!
//! A cancelled phase is still summarized from its partial ledger. Later
//! phases and the final report are then skipped.

use chrono::Utc;
use redline_rs::agent::{
    EventHandler, Harness, HarnessResult, NoopHandler, ReasoningContext, Summary, summarize,
};
use redline_rs::budget::{BudgetRun, RoutingDecision, ToolCatalog};
use redline_rs::tools::core::ToolSet;
use redline_rs::ChatBackend;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Phase, ReconConfig};
use crate::prompt;
use crate::report::{
    AssessmentOutcome, AssessmentReport, AttackReportSummary, PhaseStats, ScanSummary,
};
use crate::target::Target;
use crate::tools::ReconClassifier;

static CLASSIFIER: ReconClassifier = ReconClassifier;

/// Runs the configured phases against one target.
///
/// ```ignore
/// let catalog = recon_catalog(config.nmap)?;
/// let tools = config.build_tool_set();
/// let outcome = Assessment::new(&client, &config, &tools, &catalog)
///     .with_event_handler(&LoggingHandler)
///     .run(&target)
///     .await?;
/// println!("{}", outcome.to_markdown());
/// ```
pub struct Assessment<'a> {
    backend: &'a dyn ChatBackend,
    config: &'a ReconConfig,
    tools: &'a ToolSet,
    catalog: &'a ToolCatalog,
    handler: &'a dyn EventHandler,
    cancel: CancellationToken,
}

/// A phase run plus its summary.
struct PhaseOutcome<T> {
    summary: T,
    stats: PhaseStats,
    cancelled: bool,
}

impl<'a> Assessment<'a> {
    pub fn new(
        backend: &'a dyn ChatBackend,
        config: &'a ReconConfig,
        tools: &'a ToolSet,
        catalog: &'a ToolCatalog,
    ) -> Self {
        static NOOP: NoopHandler = NoopHandler;
        Self {
            backend,
            config,
            tools,
            catalog,
            handler: &NOOP,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Cancelling `token` stops the running phase after its in-flight work
    /// is dropped.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fails on the first reasoning or summary error.
    pub async fn run(&self, target: &Target) -> Result<AssessmentOutcome, String> {
        let started_at = Utc::now();
        let mut outcome = AssessmentOutcome {
            target: target.clone(),
            started_at,
            finished_at: started_at,
            scan: None,
            attack: None,
            assessment: None,
            phases: Vec::new(),
            cancelled: false,
        };

        for phase in self.config.phases() {
            let cancelled = match phase {
                Phase::Scan => {
                    let context = ReasoningContext::new(
                        prompt::scan_behavior_prompt(target),
                        prompt::phase_task("scan", target),
                    );
                    let done: PhaseOutcome<ScanSummary> = self
                        .run_phase(phase, context, &prompt::scan_summary_prompt(target))
                        .await?;
                    outcome.scan = Some(done.summary);
                    outcome.phases.push(done.stats);
                    done.cancelled
                }
                Phase::Attack => {
                    let recon = match &outcome.scan {
                        Some(scan) => to_json(scan),
                        None => "No reconnaissance data available.".to_string(),
                    };
                    let context = ReasoningContext::new(
                        prompt::attack_behavior_prompt(target, &recon),
                        prompt::phase_task("attack", target),
                    );
                    let done: PhaseOutcome<AttackReportSummary> = self
                        .run_phase(phase, context, &prompt::attack_summary_prompt(target))
                        .await?;
                    outcome.attack = Some(done.summary);
                    outcome.phases.push(done.stats);
                    done.cancelled
                }
            };
            if cancelled {
                warn!(%phase, "Assessment cancelled; skipping remaining phases");
                outcome.cancelled = true;
                break;
            }
        }

        if let (Some(scan), Some(attack), false) =
            (&outcome.scan, &outcome.attack, outcome.cancelled)
        {
            let system = prompt::assessment_prompt(target, &to_json(scan), &to_json(attack));
            let report: Summary<AssessmentReport> = summarize(
                self.backend,
                &self.config.build_summary_config(),
                &system,
                "Combine the reconnaissance and exploitation results into the final assessment.",
            )
            .await?;
            if let Some(last) = outcome.phases.last_mut() {
                last.total_tokens +=
                    u64::from(report.prompt_tokens) + u64::from(report.completion_tokens);
                last.estimated_cost_usd += report.estimated_cost_usd;
            }
            info!(risk = %report.value.overall_risk, "Assessment report ready");
            outcome.assessment = Some(report.value);
        }

        outcome.finished_at = Utc::now();
        Ok(outcome)
    }

    async fn run_phase<T>(
        &self,
        phase: Phase,
        context: ReasoningContext,
        summary_prompt: &str,
    ) -> Result<PhaseOutcome<T>, String>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let router = RoutingDecision::new(
            format!("{phase}_summary"),
            format!("{phase}_tools"),
            phase.capability(),
        )
        .with_reasoning_node(format!("{phase}_reasoning"));
        let budget = BudgetRun::new(self.catalog, self.config.phase_limits(phase), router)?
            .with_classifier(&CLASSIFIER);
        info!(
            %phase,
            tools = ?budget.tools_in_scope(),
            global_limit = budget.usage().limits().global_limit(),
            "Starting phase"
        );

        let result = Harness::new(self.backend, self.tools, self.config.build_harness_config(phase))
            .with_event_handler(self.handler)
            .with_cancellation(self.cancel.clone())
            .run(context, budget)
            .await
            .map_err(|e| format!("{phase} phase failed: {e}"))?;

        let summary: Summary<T> = summarize(
            self.backend,
            &self.config.build_summary_config(),
            summary_prompt,
            &prompt::ledger_message(&phase.to_string(), &result.ledger.to_json()),
        )
        .await
        .map_err(|e| format!("{phase} summary failed: {e}"))?;

        let stats = phase_stats(phase, &result, &summary);
        info!(
            %phase,
            rounds = stats.rounds_used,
            tool_calls = stats.tool_calls,
            failed = stats.failed_calls,
            "Phase finished"
        );
        Ok(PhaseOutcome {
            summary: summary.value,
            stats,
            cancelled: result.cancelled(),
        })
    }
}

fn phase_stats<T>(phase: Phase, result: &HarnessResult, summary: &Summary<T>) -> PhaseStats {
    PhaseStats {
        phase: phase.to_string(),
        rounds_used: result.rounds_used,
        tool_calls: result.usage.counters().global(),
        failed_calls: result.ledger.records().iter().filter(|r| !r.success).count(),
        termination: Some(result.termination),
        total_tokens: result.total_tokens()
            + u64::from(summary.prompt_tokens)
            + u64::from(summary.completion_tokens),
        estimated_cost_usd: result.estimated_cost_usd + summary.estimated_cost_usd,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CURL_TOOL, recon_catalog};
    use redline_rs::agent::Termination;
    use redline_rs::budget::{Capability, Scope};
    use redline_rs::tools::{FnTool, ToolOutput};
    use redline_rs::{ChatCompletion, ChatFuture, ChatRequest, ToolCall, ToolDef};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Reasoning requests pop scripted turns; summary requests get a canned
    /// document for the requested schema.
    struct Scripted {
        turns: Mutex<VecDeque<ChatCompletion>>,
        schemas: Mutex<Vec<String>>,
        cancel_on_first_turn: Option<CancellationToken>,
    }

    impl Scripted {
        fn new(turns: Vec<ChatCompletion>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
                schemas: Mutex::new(Vec::new()),
                cancel_on_first_turn: None,
            }
        }
    }

    fn canned(schema: &str) -> String {
        match schema {
            "ScanSummary" => serde_json::json!({
                "executive_summary": "admin panel exposed",
                "discovered_endpoints": [],
                "technology_stack": [],
                "sensitive_information": [],
                "vulnerabilities": [],
                "attack_recommendations": [],
            }),
            "AttackReportSummary" => serde_json::json!({
                "exploit_attempts": [],
                "compromised_assets": [],
                "security_bypasses": [],
                "attack_timeline": "",
                "impact_summary": "nothing compromised",
                "recommendations": "",
            }),
            _ => serde_json::json!({
                "overall_risk": "medium",
                "executive_summary": "x",
                "confirmed_vulnerabilities": [],
                "exploitation_chains": [],
                "remediation_plan": [],
            }),
        }
        .to_string()
    }

    impl ChatBackend for Scripted {
        fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
            let schema = request
                .response_format
                .as_ref()
                .and_then(|f| f.json_schema.as_ref());
            let completion = match schema {
                Some(schema) => {
                    self.schemas.lock().unwrap().push(schema.name.clone());
                    ChatCompletion {
                        content: Some(canned(&schema.name)),
                        ..Default::default()
                    }
                }
                None => {
                    if let Some(token) = &self.cancel_on_first_turn {
                        token.cancel();
                    }
                    self.turns.lock().unwrap().pop_front().unwrap_or_else(|| ChatCompletion {
                        content: Some("done".into()),
                        ..Default::default()
                    })
                }
            };
            Box::pin(async move { Ok(completion) })
        }
    }

    fn curl_only() -> ToolSet {
        ToolSet::new().with(FnTool::new(
            ToolDef::new(CURL_TOOL, "http", serde_json::json!({"type": "object"})),
            |_: serde_json::Value| async { ToolOutput::ok("HTTP/1.1 200 OK") },
        ))
    }

    fn target() -> Target {
        Target::web("http://localhost:8000", "demo").unwrap()
    }

    #[tokio::test]
    async fn full_pipeline_produces_every_report() {
        let config = ReconConfig::default();
        let catalog = recon_catalog(false).unwrap();
        let tools = curl_only();
        let backend = Scripted::new(vec![ChatCompletion {
            tool_calls: vec![ToolCall::new("c1", CURL_TOOL, r#"{"curl_args":"http://t"}"#)],
            ..Default::default()
        }]);

        let outcome = Assessment::new(&backend, &config, &tools, &catalog)
            .run(&target())
            .await
            .unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(
            *backend.schemas.lock().unwrap(),
            vec!["ScanSummary", "AttackReportSummary", "AssessmentReport"]
        );
        assert_eq!(outcome.phases.len(), 2);
        assert_eq!(outcome.phases[0].tool_calls, 1);
        // The attack phase starts with a fresh budget.
        assert_eq!(outcome.phases[1].tool_calls, 0);
        assert!(outcome.assessment.is_some());
    }

    #[tokio::test]
    async fn scan_scope_skips_attack_and_final_report() {
        let config = ReconConfig {
            scope: Scope::Only(Capability::Scan),
            ..Default::default()
        };
        let catalog = recon_catalog(false).unwrap();
        let tools = curl_only();
        let backend = Scripted::new(Vec::new());

        let outcome = Assessment::new(&backend, &config, &tools, &catalog)
            .run(&target())
            .await
            .unwrap();

        assert!(outcome.scan.is_some());
        assert!(outcome.attack.is_none());
        assert!(outcome.assessment.is_none());
        assert_eq!(*backend.schemas.lock().unwrap(), vec!["ScanSummary"]);
    }

    #[tokio::test]
    async fn cancelled_phase_is_summarized_and_stops_the_pipeline() {
        let config = ReconConfig::default();
        let catalog = recon_catalog(false).unwrap();
        let tools = curl_only();
        let token = CancellationToken::new();
        // The token fires while the first turn (a tool request) is produced,
        // so the tool batch is cut short.
        let mut backend = Scripted::new(vec![ChatCompletion {
            tool_calls: vec![ToolCall::new("c1", CURL_TOOL, "{}")],
            ..Default::default()
        }]);
        backend.cancel_on_first_turn = Some(token.clone());

        let outcome = Assessment::new(&backend, &config, &tools, &catalog)
            .with_cancellation(token)
            .run(&target())
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.phases.len(), 1);
        assert_eq!(outcome.phases[0].termination, Some(Termination::Cancelled));
        assert!(outcome.scan.is_some());
        assert!(outcome.attack.is_none());
        assert_eq!(*backend.schemas.lock().unwrap(), vec!["ScanSummary"]);
    }

    #[tokio::test]
    async fn limits_naming_unknown_tools_fail_the_run() {
        let config = ReconConfig {
            tool_limits: vec![("nikto".into(), 1)],
            ..Default::default()
        };
        let catalog = recon_catalog(false).unwrap();
        let tools = curl_only();
        let backend = Scripted::new(Vec::new());

        let err = Assessment::new(&backend, &config, &tools, &catalog)
            .run(&target())
            .await
            .unwrap_err();
        assert!(err.contains("nikto"));
    }
}
