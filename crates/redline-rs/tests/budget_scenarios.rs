//! End-to-end budget behavior through the public API.
//!
//! The first half drives `BudgetRun` directly with hand-built transcripts;
//! the second runs the full harness against a scripted backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use redline_rs::prelude::*;
use redline_rs::{ChatCompletion, ChatFuture, ChatRequest};

const FFUF: &str = "ffuf_directory_scan";
const CURL: &str = "curl_tool";

fn catalog() -> ToolCatalog {
    ToolCatalog::new(vec![
        CatalogTool::new(FFUF, [Capability::Scan], "directory fuzzing"),
        CatalogTool::new(CURL, [Capability::Scan, Capability::Attack], "raw HTTP"),
    ])
    .unwrap()
}

fn request(calls: &[(&str, &str)]) -> Message {
    Message::assistant_tool_calls(
        calls
            .iter()
            .map(|(id, tool)| ToolCall::new(*id, *tool, "{}"))
            .collect(),
    )
}

// ── Routing scenarios ────────────────────────────────────────────────

#[test]
fn exhausted_tool_request_loops_back_to_reasoning() {
    let catalog = catalog();
    let limits = UsageLimits::new(20)
        .with_tool_limit(FFUF, 2)
        .with_tool_limit(CURL, 5);
    let mut run =
        BudgetRun::new(&catalog, limits, RoutingDecision::scoped(Capability::Scan)).unwrap();

    let mut transcript = vec![
        request(&[("f1", FFUF), ("f2", FFUF)]),
        Message::tool_result("f1", "[]"),
        Message::tool_result("f2", "[]"),
    ];
    run.observe(&transcript);
    transcript.push(request(&[("f3", FFUF)]));

    assert_eq!(run.route(&transcript), Route::Reasoning);
    assert!(run.admit(transcript.last().unwrap().requested_calls()).admitted.is_empty());
}

#[test]
fn global_limit_beats_pending_request() {
    let catalog = catalog();
    let limits = UsageLimits::new(1).with_tool_limit(CURL, 10);
    let mut run =
        BudgetRun::new(&catalog, limits, RoutingDecision::scoped(Capability::Scan)).unwrap();

    let mut transcript = vec![request(&[("c1", CURL)]), Message::tool_result("c1", "200")];
    run.observe(&transcript);
    transcript.push(request(&[("c2", CURL)]));

    assert_eq!(run.route(&transcript), Route::Terminal);
}

#[test]
fn duplicate_call_id_is_counted_once() {
    let catalog = catalog();
    let mut run = BudgetRun::new(
        &catalog,
        UsageLimits::new(20),
        RoutingDecision::scoped(Capability::Scan),
    )
    .unwrap();

    let mut transcript = vec![
        request(&[("abc123", CURL)]),
        Message::tool_result("abc123", "first"),
    ];
    run.observe(&transcript);
    transcript.push(Message::tool_result("abc123", "again"));
    let report = run.observe(&transcript);

    assert!(report.accepted.is_empty());
    assert_eq!(run.usage().counters().global(), 1);
    assert_eq!(run.ledger().records()[0].raw_result, "first");
}

#[test]
fn nothing_left_in_scope_terminates() {
    let catalog = catalog();
    let limits = UsageLimits::new(20).with_tool_limit(CURL, 1);
    let mut run =
        BudgetRun::new(&catalog, limits, RoutingDecision::scoped(Capability::Attack)).unwrap();

    let mut transcript = vec![request(&[("c1", CURL)]), Message::tool_result("c1", "200")];
    run.observe(&transcript);
    transcript.push(Message::assistant_text("I think we are done."));

    assert_eq!(run.route(&transcript), Route::Terminal);
    assert!(!run.usage().is_global_exhausted());
}

#[test]
fn orphan_result_is_recorded_without_arguments() {
    let catalog = catalog();
    let mut run = BudgetRun::new(
        &catalog,
        UsageLimits::new(20),
        RoutingDecision::scoped(Capability::Scan),
    )
    .unwrap();

    let transcript = vec![Message::tool_result_named("xyz", CURL, "HTTP/1.1 302")];
    run.observe(&transcript);

    let record = &run.ledger().records()[0];
    assert_eq!(record.call_id, "xyz");
    assert!(record.arguments.is_none());
    assert_eq!(run.usage().counters().global(), 1);
}

#[test]
fn a_model_that_keeps_requesting_tools_eventually_stops() {
    let catalog = catalog();
    let limits = UsageLimits::new(7)
        .with_tool_limit(FFUF, 3)
        .with_tool_limit(CURL, 3);
    let mut run =
        BudgetRun::new(&catalog, limits, RoutingDecision::scoped(Capability::Scan)).unwrap();

    let mut transcript = Vec::new();
    let mut turns = 0;
    while !run.is_terminal() {
        turns += 1;
        assert!(turns < 50, "router never terminated");
        let id = format!("call-{turns}");
        // Alternate between a catalog tool and one nobody registered.
        let tool = match turns % 3 {
            0 => "nikto",
            1 => FFUF,
            _ => CURL,
        };
        transcript.push(request(&[(id.as_str(), tool)]));
        if run.route(&transcript) == Route::Tools {
            transcript.push(Message::tool_result(id.as_str(), "Error: no such binary"));
            run.step(&transcript);
        }
    }
    assert!(run.usage().counters().global() <= 7);
}

// ── Harness ──────────────────────────────────────────────────────────

struct Scripted(Mutex<VecDeque<ChatCompletion>>);

impl ChatBackend for Scripted {
    fn complete<'a>(&'a self, _request: &'a ChatRequest) -> ChatFuture<'a> {
        let next = self.0.lock().unwrap().pop_front().unwrap_or_else(|| ChatCompletion {
            content: Some("no further actions".into()),
            ..Default::default()
        });
        Box::pin(async move { Ok(next) })
    }
}

fn completion(calls: &[(&str, &str)]) -> ChatCompletion {
    ChatCompletion {
        tool_calls: calls
            .iter()
            .map(|(id, tool)| ToolCall::new(*id, *tool, "{}"))
            .collect(),
        ..Default::default()
    }
}

fn tools() -> ToolSet {
    let def = |name: &str| ToolDef::new(name, name, serde_json::json!({"type": "object"}));
    ToolSet::new()
        .with(FnTool::new(def(FFUF), |_: serde_json::Value| async {
            ToolOutput::ok("{\"findings\":[{\"url\":\"http://t/admin\",\"status\":403}]}")
        }))
        .with(FnTool::new(def(CURL), |_: serde_json::Value| async {
            ToolOutput::failed("curl exited with status 7")
        }))
}

#[tokio::test]
async fn harness_skips_over_budget_calls_and_reports_them() {
    let catalog = catalog();
    let tools = tools();
    let backend = Scripted(Mutex::new(
        vec![
            completion(&[("f1", FFUF), ("f2", FFUF), ("c1", CURL)]),
            completion(&[("c2", CURL), ("x1", "nikto")]),
        ]
        .into(),
    ));

    let skipped = Arc::new(Mutex::new(Vec::new()));
    let unknown = Arc::new(Mutex::new(Vec::new()));
    let (s, u) = (skipped.clone(), unknown.clone());
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(move |event| {
            match event {
                HarnessEvent::ToolSkipped { call_id, .. } => {
                    s.lock().unwrap().push(call_id.to_string());
                }
                HarnessEvent::UnknownTool { name, .. } => {
                    u.lock().unwrap().push(name.to_string());
                }
                _ => {}
            }
            None
        }));

    let limits = UsageLimits::new(10)
        .with_tool_limit(FFUF, 1)
        .with_tool_limit(CURL, 2);
    let run = BudgetRun::new(&catalog, limits, RoutingDecision::scoped(Capability::Scan)).unwrap();

    let result = Harness::new(&backend, &tools, HarnessConfig::new("test-model"))
        .with_event_handler(&handler)
        .run(ReasoningContext::new("Scan the target.", "Target: http://t"), run)
        .await
        .unwrap();

    assert_eq!(*skipped.lock().unwrap(), vec!["f2"]);
    assert_eq!(*unknown.lock().unwrap(), vec!["nikto"]);
    assert_eq!(result.termination, Termination::Terminal);

    // f1, c1, c2 and the unknown tool's failed result.
    assert_eq!(result.ledger.len(), 4);
    assert_eq!(result.usage.counters().global(), 4);
    assert_eq!(result.usage.counters().count_for("nikto"), 1);
    let failures = result.ledger.records().iter().filter(|r| !r.success).count();
    assert_eq!(failures, 3);
}
