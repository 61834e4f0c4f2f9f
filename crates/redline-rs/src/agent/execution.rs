//! Request dispatch and tool execution for a single round.
//!
//! Called by [`super::harness::Harness::run()`]: one function sends the
//! reasoning request with retries, the other runs an admitted tool batch
//! with bounded parallelism and cancellation.

use super::config::HarnessConfig;
use super::events::{EventHandler, EventResponse, HarnessEvent};
use crate::api::retry::retry_api_call;
use crate::tools::core::{ToolOutput, ToolSet};
use crate::{ChatBackend, ChatCompletion, ChatRequest, Message, ToolCall, ToolDef};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

// ── Send request ──────────────────────────────────────────────────

/// Build the reasoning request for this round and send it, retrying
/// transient failures per `config.retry`.
pub(crate) async fn send_reasoning_request(
    config: &HarnessConfig,
    backend: &dyn ChatBackend,
    messages: Vec<Message>,
    tools: Vec<ToolDef>,
) -> Result<ChatCompletion, String> {
    let has_tools = !tools.is_empty();
    let body = ChatRequest {
        model: Some(config.model.clone()),
        messages,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        tools: has_tools.then_some(tools),
        parallel_tool_calls: has_tools.then_some(config.parallel_tool_calls),
        ..Default::default()
    };
    retry_api_call(&config.retry, || backend.complete(&body)).await
}

// ── Tool execution ────────────────────────────────────────────────

/// Result turns for a batch, plus whether cancellation cut it short.
pub(crate) struct BatchOutcome {
    /// One tool-result turn per call that finished, in request order.
    pub results: Vec<Message>,
    pub cancelled: bool,
}

/// Execute `calls`, at most `max_parallel` at a time.
///
/// Every call that completes yields exactly one tool-result turn, failures
/// and timeouts included. Handlers see [`HarnessEvent::ToolExecuting`]
/// first and may deny a call, which turns it into a failed result without
/// running it. When `cancel` fires, unfinished calls are dropped and get no
/// result turn.
pub(crate) async fn execute_tool_calls(
    tools: &ToolSet,
    calls: &[ToolCall],
    max_parallel: usize,
    event_handler: &dyn EventHandler,
    cancel: &CancellationToken,
) -> BatchOutcome {
    let mut outputs: Vec<Option<ToolOutput>> = vec![None; calls.len()];

    // Approval is sequential: handler responses decide what runs.
    let mut approved: Vec<(usize, &ToolCall)> = Vec::with_capacity(calls.len());
    for (index, call) in calls.iter().enumerate() {
        let response = event_handler.on_event(&HarnessEvent::ToolExecuting {
            name: &call.function.name,
            arguments: &call.function.arguments,
        });
        match response {
            Some(EventResponse::Deny(reason)) => {
                warn!(tool = %call.function.name, call_id = %call.id, "Tool call denied: {reason}");
                outputs[index] = Some(ToolOutput::failed(format!(
                    "tool '{}' was denied: {reason}",
                    call.function.name
                )));
            }
            None => approved.push((index, call)),
        }
    }

    let mut pending = futures::stream::iter(approved.into_iter().map(|(index, call)| async move {
        let output = tools
            .execute(&call.function.name, &call.function.arguments)
            .await;
        (index, output)
    }))
    .buffer_unordered(max_parallel.max(1));

    let mut cancelled = false;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            next = pending.next() => match next {
                Some((index, output)) => outputs[index] = Some(output),
                None => break,
            },
        }
    }
    // Dropping the stream drops in-flight tool futures.
    drop(pending);

    let results = calls
        .iter()
        .zip(outputs)
        .filter_map(|(call, output)| {
            let output = output?;
            let content = output.to_content();
            event_handler.on_event(&HarnessEvent::ToolResult {
                name: &call.function.name,
                call_id: &call.id,
                success: output.success,
                result: &content,
            });
            Some(Message::tool_result_named(
                call.id.clone(),
                call.function.name.clone(),
                content,
            ))
        })
        .collect();

    BatchOutcome { results, cancelled }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::{FnEventHandler, NoopHandler};
    use crate::tools::core::FnTool;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Deserialize, schemars::JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    #[derive(Deserialize, schemars::JsonSchema)]
    struct SleepArgs {
        millis: u64,
    }

    fn toolset() -> ToolSet {
        ToolSet::new()
            .with(FnTool::new(
                ToolDef::new("echo", "echo", crate::json_schema_for::<EchoArgs>()),
                |args: EchoArgs| async move { ToolOutput::ok(args.text) },
            ))
            .with(FnTool::new(
                ToolDef::new("sleep", "sleep", crate::json_schema_for::<SleepArgs>()),
                |args: SleepArgs| async move {
                    tokio::time::sleep(Duration::from_millis(args.millis)).await;
                    ToolOutput::ok("slept")
                },
            ))
    }

    #[tokio::test]
    async fn results_follow_request_order() {
        let tools = toolset();
        let calls = vec![
            ToolCall::new("a", "sleep", r#"{"millis":40}"#),
            ToolCall::new("b", "echo", r#"{"text":"hi"}"#),
            ToolCall::new("c", "missing", "{}"),
        ];
        let outcome =
            execute_tool_calls(&tools, &calls, 4, &NoopHandler, &CancellationToken::new()).await;

        assert!(!outcome.cancelled);
        let ids: Vec<_> = outcome
            .results
            .iter()
            .map(|m| m.tool_call_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(outcome.results[1].content.as_deref(), Some("hi"));
        assert!(
            outcome.results[2]
                .content
                .as_deref()
                .unwrap()
                .starts_with("Error: unknown tool 'missing'")
        );
    }

    #[tokio::test]
    async fn denied_calls_fail_without_running() {
        let tools = toolset();
        let calls = vec![
            ToolCall::new("a", "echo", r#"{"text":"kept"}"#),
            ToolCall::new("b", "sleep", r#"{"millis":10}"#),
        ];
        let handler = FnEventHandler::new(|event| match event {
            HarnessEvent::ToolExecuting { name: "sleep", .. } => {
                Some(EventResponse::Deny("not in scope".into()))
            }
            _ => None,
        });
        let outcome =
            execute_tool_calls(&tools, &calls, 1, &handler, &CancellationToken::new()).await;

        assert_eq!(outcome.results.len(), 2);
        let denied = outcome.results[1].content.as_deref().unwrap();
        assert!(denied.starts_with("Error: tool 'sleep' was denied: not in scope"));
    }

    #[tokio::test]
    async fn cancellation_keeps_finished_results() {
        let tools = toolset();
        let calls = vec![
            ToolCall::new("fast", "echo", r#"{"text":"done"}"#),
            ToolCall::new("slow", "sleep", r#"{"millis":60000}"#),
        ];
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = execute_tool_calls(&tools, &calls, 2, &NoopHandler, &token).await;
        assert!(outcome.cancelled);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].tool_call_id.as_deref(), Some("fast"));
    }
}
