//! `curl_tool`: free-form HTTP requests through the curl binary.
//!
//! The model passes curl arguments as a single string. It often gets the
//! quoting wrong, so splitting degrades in steps: shell-style split, then
//! the same after closing unbalanced quotes, then a plain whitespace split
//! with quotes removed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use redline_rs::ToolDef;
use redline_rs::tools::{Tool, ToolFuture, ToolOutput, parse_tool_args};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::process::run_with_deadline;

pub const DEFAULT_CURL_TIMEOUT_SECS: u64 = 60;

#[derive(Deserialize, JsonSchema)]
pub struct CurlArgs {
    /// curl arguments as one properly quoted string, e.g.
    /// "-X POST http://localhost:8000/login -d 'user=admin&pass=x'".
    /// `-i` is always added.
    pub curl_args: String,
    /// Deadline in seconds (default 60).
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_CURL_TIMEOUT_SECS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurlResult {
    pub command: String,
    /// Raw response including headers.
    pub content: String,
    pub exit_code: i32,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CurlResult {
    fn into_output(self) -> ToolOutput {
        let json = serde_json::to_string(&self).unwrap_or_default();
        match self.error {
            Some(error) => ToolOutput::failed_with_payload(error, json),
            None => ToolOutput::ok(json),
        }
    }
}

// ── Argument splitting ──────────────────────────────────────────────

/// Split like a POSIX shell: single quotes are literal, double quotes allow
/// backslash escapes, a bare backslash escapes the next character.
fn shell_split(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("no closing single quote".into()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err("no closing double quote".into()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("no closing double quote".into()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err("trailing backslash".into()),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn balance_quotes(input: &str) -> String {
    let mut balanced = input.to_string();
    if input.matches('\'').count() % 2 == 1 {
        balanced.push('\'');
    }
    if input.matches('"').count() % 2 == 1 {
        balanced.push('"');
    }
    balanced
}

/// Split `curl_args` into argv, never failing.
pub fn split_args(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    match shell_split(input) {
        Ok(words) => words,
        Err(e) => {
            warn!("curl_args did not parse ({e}); balancing quotes");
            shell_split(&balance_quotes(input)).unwrap_or_else(|_| {
                warn!("Quote balancing failed; falling back to whitespace split");
                input
                    .replace(['\'', '"'], "")
                    .split_whitespace()
                    .map(String::from)
                    .collect()
            })
        }
    }
}

// ── Tool ────────────────────────────────────────────────────────────

/// The `curl_tool` tool.
pub struct Curl {
    binary: String,
}

impl Curl {
    pub fn new() -> Self {
        Self {
            binary: "curl".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: CurlArgs) -> CurlResult {
        let mut argv = vec!["-i".to_string()];
        argv.extend(split_args(&args.curl_args));
        let command = format!("curl {}", argv.join(" "));

        if args.curl_args.trim().is_empty() {
            return CurlResult {
                command,
                content: String::new(),
                exit_code: 1,
                execution_time: 0.0,
                timestamp: Utc::now(),
                error: Some("no arguments provided to curl".into()),
            };
        }

        info!("Executing {command}");
        let timestamp = Utc::now();
        let process =
            match run_with_deadline(&self.binary, &argv, Duration::from_secs(args.timeout)).await {
                Ok(p) => p,
                Err(e) => {
                    return CurlResult {
                        command,
                        content: String::new(),
                        exit_code: 1,
                        execution_time: 0.0,
                        timestamp,
                        error: Some(e),
                    };
                }
            };

        let mut content = process.stdout.clone();
        if !process.stderr.trim().is_empty() && !process.completed() {
            content.push_str("\n[stderr]\n");
            content.push_str(&process.stderr);
        }
        let error = if process.timed_out {
            Some(format!("curl timed out after {} seconds", args.timeout))
        } else if !process.completed() {
            Some(format!(
                "curl exited with code {}",
                process.exit_code.unwrap_or(-1)
            ))
        } else {
            None
        };
        if let Some(e) = &error {
            warn!("{command}: {e}");
        }

        CurlResult {
            command,
            content,
            exit_code: process.exit_code.unwrap_or(-1),
            execution_time: process.elapsed.as_secs_f64(),
            timestamp,
            error,
        }
    }
}

impl Default for Curl {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for Curl {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            super::CURL_TOOL,
            "Execute HTTP requests with custom headers, methods, and payloads. \
             Returns response data including status codes, headers, and body content.",
            redline_rs::json_schema_for::<CurlArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            match parse_tool_args::<CurlArgs>(&arguments) {
                Ok(args) => self.run(args).await.into_output(),
                Err(e) => ToolOutput::failed(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quoted_arguments() {
        assert_eq!(
            split_args("-X POST http://t/login -d 'user=admin&pass=a b'"),
            vec!["-X", "POST", "http://t/login", "-d", "user=admin&pass=a b"]
        );
        assert_eq!(
            split_args(r#"-H "X-Note: say \"hi\"" http://t"#),
            vec!["-H", "X-Note: say \"hi\"", "http://t"]
        );
    }

    #[test]
    fn balances_a_missing_closing_quote() {
        assert_eq!(
            split_args("-X GET 'http://t/users?id=1 OR 1=1"),
            vec!["-X", "GET", "http://t/users?id=1 OR 1=1"]
        );
    }

    #[test]
    fn falls_back_to_whitespace_split() {
        // A trailing backslash cannot be fixed by balancing quotes.
        assert_eq!(split_args(r"http://t/a b\"), vec!["http://t/a", "b\\"]);
        assert!(split_args("   ").is_empty());
    }

    #[tokio::test]
    async fn empty_arguments_fail() {
        let output = Curl::new().execute(r#"{"curl_args":"  "}"#).await;
        assert!(!output.success);
        assert!(output.to_content().contains("no arguments"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let output = Curl::new()
            .with_binary("false")
            .execute(r#"{"curl_args":"http://t/"}"#)
            .await;
        assert!(!output.success);
        let result: CurlResult = serde_json::from_str(&output.payload).unwrap();
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.error.as_deref(), Some("curl exited with code 1"));
        assert!(output.to_content().starts_with("Error: curl exited with code 1"));
    }

    #[tokio::test]
    async fn successful_run_returns_raw_output() {
        let output = Curl::new()
            .with_binary("echo")
            .execute(r#"{"curl_args":"-H 'X-Test: 1' http://t/"}"#)
            .await;
        assert!(output.success);
        let result: CurlResult = serde_json::from_str(&output.payload).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.content.trim(), "-i -H X-Test: 1 http://t/");
        assert_eq!(result.command, "curl -i -H X-Test: 1 http://t/");
    }
}
