//! Structured-output summary call.
//!
//! Runs once after a harness run terminates: the caller serializes the
//! ledger into the user message and gets back a typed report.

use super::config::HarnessConfig;
use crate::api::retry::retry_api_call;
use crate::api::tracing::pricing_for_model;
use crate::{ChatBackend, ChatRequest, Message, ResponseFormat};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// A parsed summary plus what it cost.
#[derive(Debug, Clone)]
pub struct Summary<T> {
    pub value: T,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Ask the model for a `T` using a JSON-schema `response_format`.
///
/// The schema name is the Rust type name. Code fences around the JSON are
/// tolerated; anything else that fails to parse is an error.
pub async fn summarize<T>(
    backend: &dyn ChatBackend,
    config: &HarnessConfig,
    system: &str,
    user: &str,
) -> Result<Summary<T>, String>
where
    T: JsonSchema + DeserializeOwned,
{
    let name = schema_name::<T>();
    let body = ChatRequest {
        model: Some(config.model.clone()),
        messages: vec![Message::system(system), Message::user(user)],
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        response_format: Some(ResponseFormat::schema_for::<T>(&name)),
        ..Default::default()
    };

    let completion = retry_api_call(&config.retry, || backend.complete(&body)).await?;
    let (prompt_tokens, completion_tokens) = completion.usage.as_ref().map_or((0, 0), |u| {
        (
            u.prompt_tokens.unwrap_or(0),
            u.completion_tokens.unwrap_or(0),
        )
    });

    let Some(content) = completion.content.filter(|c| !c.trim().is_empty()) else {
        warn!(schema = %name, "Summary call returned no content");
        return Err(format!("summary '{name}' returned no content"));
    };
    let json = strip_code_fence(&content);
    let value = serde_json::from_str::<T>(json)
        .map_err(|e| format!("failed to parse summary '{name}': {e}"))?;
    debug!(schema = %name, bytes = content.len(), "Parsed structured summary");

    Ok(Summary {
        value,
        prompt_tokens,
        completion_tokens,
        estimated_cost_usd: pricing_for_model(&config.model)
            .estimate_cost(prompt_tokens, completion_tokens),
    })
}

fn schema_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let short = full.rsplit("::").next().unwrap_or(full);
    short
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatCompletion, ChatFuture, UsageInfo};
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Deserialize, JsonSchema, Debug, PartialEq)]
    struct Verdict {
        risk: String,
        findings: u32,
    }

    struct OneShot {
        content: Option<String>,
        seen_format: Mutex<Option<String>>,
    }

    impl ChatBackend for OneShot {
        fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
            *self.seen_format.lock().unwrap() = request
                .response_format
                .as_ref()
                .and_then(|f| serde_json::to_value(f).ok())
                .map(|v| v["json_schema"]["name"].to_string());
            let content = self.content.clone();
            Box::pin(async move {
                Ok(ChatCompletion {
                    content,
                    usage: Some(UsageInfo {
                        prompt_tokens: Some(1_000),
                        completion_tokens: Some(100),
                        total_tokens: Some(1_100),
                    }),
                    ..Default::default()
                })
            })
        }
    }

    fn backend(content: Option<&str>) -> OneShot {
        OneShot {
            content: content.map(str::to_string),
            seen_format: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn parses_fenced_json() {
        let backend = backend(Some("```json\n{\"risk\":\"high\",\"findings\":3}\n```"));
        let summary = summarize::<Verdict>(&backend, &HarnessConfig::new("m"), "sys", "ledger")
            .await
            .unwrap();
        assert_eq!(
            summary.value,
            Verdict {
                risk: "high".into(),
                findings: 3
            }
        );
        assert_eq!(summary.prompt_tokens, 1_000);
        assert_eq!(
            backend.seen_format.lock().unwrap().as_deref(),
            Some("\"Verdict\"")
        );
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let err = summarize::<Verdict>(&backend(None), &HarnessConfig::new("m"), "s", "u")
            .await
            .unwrap_err();
        assert!(err.contains("no content"));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let err = summarize::<Verdict>(
            &backend(Some("{\"risk\": 1}")),
            &HarnessConfig::new("m"),
            "s",
            "u",
        )
        .await
        .unwrap_err();
        assert!(err.starts_with("failed to parse summary 'Verdict'"));
    }

    #[test]
    fn strips_plain_fences() {
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
