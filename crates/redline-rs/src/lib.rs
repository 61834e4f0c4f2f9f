//! Budgeted tool-call routing for LLM-driven security agents.
//!
//! `redline-rs` runs a ReAct-style loop on top of the
//! [OpenRouter](https://openrouter.ai/) chat completions API. A reasoning
//! turn may request tool calls, the tools run, and the transcript grows. After
//! every turn the [`budget`] module decides whether to run tools, loop back
//! to reasoning, or stop, while enforcing per-tool and global call budgets.
//!
//! # Getting started
//!
//! ```ignore
//! use redline_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let client = OpenRouterClient::new(std::env::var("OPENROUTER_KEY").unwrap())?;
//!
//!     let catalog = ToolCatalog::new(vec![
//!         CatalogTool::new("curl_tool", [Capability::Scan, Capability::Attack], "HTTP probe"),
//!     ])?;
//!     let tools = ToolSet::new().with(MyCurlTool);
//!
//!     let limits = UsageLimits::new(20).with_tool_limit("curl_tool", 5);
//!     let run = BudgetRun::new(&catalog, limits, RoutingDecision::scoped(Capability::Scan))?;
//!
//!     let context = ReasoningContext::new("Probe the target.", "Target: http://localhost:8000");
//!     let result = Harness::new(&client, &tools, HarnessConfig::new("openai/gpt-4o"))
//!         .with_event_handler(&LoggingHandler)
//!         .run(context, run)
//!         .await?;
//!
//!     println!("{} tool calls recorded", result.ledger.len());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`budget`] | [`ToolCatalog`](budget::ToolCatalog), [`UsageTracker`](budget::UsageTracker), [`ToolResultLedger`](budget::ToolResultLedger), [`TranscriptScanner`](budget::TranscriptScanner), [`RoutingDecision`](budget::RoutingDecision) |
//! | [`agent`] | [`Harness`](agent::Harness) loop, config, events, structured summaries |
//! | [`tools`] | [`Tool`](tools::Tool) trait, [`ToolSet`](tools::ToolSet) dispatch with per-tool timeouts |
//! | [`api`] | Retry with backoff, trace ids, cost tracking |

pub mod agent;
pub mod api;
pub mod budget;
pub mod prelude;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for reasoning and summary calls.
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema value for a type implementing `JsonSchema`.
///
/// Used both for tool parameter schemas and for the structured-output
/// `response_format` of summary calls.
///
/// ```
/// use redline_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ProbeArgs {
///     url: String,
///     #[serde(default)]
///     timeout: Option<u64>,
/// }
///
/// let schema = json_schema_for::<ProbeArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"url".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unset optional fields are omitted.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    /// Whether the model may request several tool calls in one turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema,
}

/// Named JSON schema attached to a `json_schema` response format.
#[derive(Serialize, Debug, Clone)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

/// Output format constraint for structured responses.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaFormat>,
}

impl ResponseFormat {
    /// Constrain the response to the JSON schema of `T`.
    pub fn schema_for<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonSchema,
            json_schema: Some(JsonSchemaFormat {
                name: name.into(),
                strict: false,
                schema: json_schema_for::<T>(),
            }),
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the transcript.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// One turn of the transcript.
///
/// Tool-result turns carry the `tool_call_id` of the request they answer and,
/// when known, the tool `name`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn bare(role: MessageRole) -> Self {
        Self {
            role,
            content: None,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(MessageRole::System)
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(MessageRole::User)
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(MessageRole::Assistant)
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::bare(MessageRole::Assistant)
        }
    }

    /// Assistant turn with optional text and any number of tool requests.
    pub fn assistant(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls: if calls.is_empty() { None } else { Some(calls) },
            ..Self::bare(MessageRole::Assistant)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
            ..Self::bare(MessageRole::Tool)
        }
    }

    pub fn tool_result_named(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::tool_result(call_id, content)
        }
    }

    /// Tool-call requests carried by this turn (empty for non-assistant turns).
    pub fn requested_calls(&self) -> &[ToolCall] {
        match (&self.role, &self.tool_calls) {
            (MessageRole::Assistant, Some(calls)) => calls,
            _ => &[],
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool-call request returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Arguments parsed as a JSON object. `None` when the raw string is not
    /// a JSON object.
    pub fn parsed_arguments(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match serde_json::from_str::<serde_json::Value>(&self.function.arguments) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug, Default)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

impl ChatCompletion {
    /// Convert the completion into the assistant turn appended to the transcript.
    pub fn into_message(self) -> Message {
        let content = self.content.filter(|c| !c.is_empty());
        Message::assistant(content, self.tool_calls)
    }
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/redline-sec/redline", "redline")
    }

    /// Create a client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("redline/0.1")
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}",
            body.model.as_deref().unwrap_or("(none)"),
            body.messages.len(),
            body.tools.as_ref().map_or(0, |t| t.len()),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }
        parse_completion(&text)
    }
}

// ── Backend seam ───────────────────────────────────────────────────

pub type ChatFuture<'a> =
    std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ChatCompletion, String>> + Send + 'a>,
    >;

/// Anything that can answer a chat completion request.
///
/// [`OpenRouterClient`] is the production implementation; tests script
/// their own.
pub trait ChatBackend: Send + Sync {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a>;
}

impl ChatBackend for OpenRouterClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(OpenRouterClient::chat(self, request))
    }
}

/// Parse a raw chat completion body.
pub(crate) fn parse_completion(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
        debug!("LLM output: empty (no choices)");
        return Ok(ChatCompletion {
            usage: parsed.usage,
            ..Default::default()
        });
    };

    let tool_calls = choice.message.tool_calls.unwrap_or_default();
    debug!(
        "LLM output: {} chars text, {} tool call(s)",
        choice.message.content.as_ref().map_or(0, |s| s.len()),
        tool_calls.len()
    );
    Ok(ChatCompletion {
        content: choice.message.content,
        tool_calls,
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let tool = Message::tool_result_named("call-1", "curl_tool", "HTTP/1.1 200 OK");
        assert_eq!(tool.role, MessageRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(tool.name.as_deref(), Some("curl_tool"));
    }

    #[test]
    fn requested_calls_only_on_assistant_turns() {
        let call = ToolCall::new("c1", "curl_tool", "{}");
        let assistant = Message::assistant(None, vec![call.clone()]);
        assert_eq!(assistant.requested_calls().len(), 1);

        let empty = Message::assistant(Some("thinking".into()), vec![]);
        assert!(empty.tool_calls.is_none());
        assert!(empty.requested_calls().is_empty());

        let mut odd = Message::user("hi");
        odd.tool_calls = Some(vec![call]);
        assert!(odd.requested_calls().is_empty());
    }

    #[test]
    fn parsed_arguments_requires_object() {
        let call = ToolCall::new("c1", "ffuf_directory_scan", r#"{"target":"http://x"}"#);
        let args = call.parsed_arguments().unwrap();
        assert_eq!(args["target"], "http://x");

        assert!(ToolCall::new("c2", "t", "[1,2]").parsed_arguments().is_none());
        assert!(ToolCall::new("c3", "t", "not json").parsed_arguments().is_none());
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: Some("test-model".into()),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("temperature").is_none());
        assert!(json.get("parallel_tool_calls").is_none());
        assert!(json["messages"][0].get("name").is_none());
    }

    #[test]
    fn response_format_carries_schema() {
        #[derive(JsonSchema)]
        #[allow(dead_code)]
        struct Report {
            summary: String,
        }
        let fmt = ResponseFormat::schema_for::<Report>("report");
        let json = serde_json::to_value(&fmt).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["json_schema"]["name"], "report");
        assert_eq!(json["json_schema"]["schema"]["type"], "object");
    }

    #[test]
    fn parse_completion_with_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "curl_tool", "arguments": "{\"curl_args\":\"http://x\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let completion = parse_completion(body).unwrap();
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].function.name, "curl_tool");
        assert_eq!(completion.usage.unwrap().total_tokens, Some(15));
    }

    #[test]
    fn parse_completion_surfaces_api_error() {
        let err = parse_completion(r#"{"error": {"message": "rate limited"}}"#).unwrap_err();
        assert!(err.contains("rate limited"));
    }

    #[test]
    fn into_message_drops_empty_text() {
        let completion = ChatCompletion {
            content: Some(String::new()),
            ..Default::default()
        };
        let msg = completion.into_message();
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(msg.content.is_none());
        assert!(msg.tool_calls.is_none());
    }
}
