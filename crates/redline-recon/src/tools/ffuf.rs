//! `ffuf_directory_scan`: wordlist-driven directory and file discovery.

use std::path::{Path, PathBuf};
use std::time::Duration;

use redline_rs::ToolDef;
use redline_rs::tools::{Tool, ToolFuture, ToolOutput, parse_tool_args};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::process::{count_lines, read_output, run_with_deadline, temp_output};

pub const DEFAULT_EXTENSIONS: &str = "php,html,js,txt";
pub const DEFAULT_FFUF_TIMEOUT_SECS: u64 = 300;

/// Status codes worth reporting.
const MATCH_CODES: &str = "200,201,204,301,302,307,401,403,500";

/// Wordlists the tool accepts, mapped to `<wordlist_dir>/<name>.txt`.
pub const WORDLIST_TYPES: &[&str] = &["common", "small"];

#[derive(Deserialize, JsonSchema)]
pub struct FfufArgs {
    /// Base URL to fuzz, e.g. "http://localhost:8000".
    pub target: String,
    /// Coverage level: "common" (~4,700 entries) or "small" (~1,000 entries).
    #[serde(default = "default_wordlist")]
    pub wordlist_type: String,
    /// Comma-separated extensions without spaces, e.g. "php,html,js,txt".
    #[serde(default = "default_extensions")]
    pub extensions: String,
    /// Scan deadline in seconds (default 300).
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_wordlist() -> String {
    "common".to_string()
}

fn default_extensions() -> String {
    DEFAULT_EXTENSIONS.to_string()
}

/// One discovered path, as ffuf writes it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FfufFinding {
    pub url: String,
    pub status: u16,
    pub length: u64,
    pub words: u64,
    pub lines: u64,
    #[serde(rename = "content-type", default)]
    pub content_type: String,
    #[serde(default)]
    pub redirectlocation: String,
}

impl FfufFinding {
    /// 200, 401, 403 and 500 responses are the ones worth following up.
    pub fn is_interesting(&self) -> bool {
        matches!(self.status, 200 | 401 | 403 | 500)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FfufScanResult {
    pub findings: Vec<FfufFinding>,
    pub count: usize,
    pub scan_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub target: String,
    pub wordlist_type: String,
    pub wordlist_size: usize,
    pub extensions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_duration: Option<f64>,
}

impl FfufScanResult {
    fn error(args: &FfufArgs, message: impl Into<String>) -> Self {
        Self {
            findings: Vec::new(),
            count: 0,
            scan_completed: false,
            error: Some(message.into()),
            target: args.target.clone(),
            wordlist_type: args.wordlist_type.clone(),
            wordlist_size: 0,
            extensions: args.extensions.clone(),
            scan_duration: None,
        }
    }

    fn into_output(self) -> ToolOutput {
        let json = serde_json::to_string(&self).unwrap_or_default();
        match self.error {
            Some(error) => ToolOutput::failed_with_payload(error, json),
            None => ToolOutput::ok(json),
        }
    }
}

/// Reject arguments ffuf would choke on, with a message the model can act on.
pub fn validate_args(args: &FfufArgs) -> Result<(), String> {
    if args.target.trim().is_empty() {
        return Err("'target' must be a non-empty URL such as 'http://localhost:8000'".into());
    }
    if !args.target.starts_with("http://") && !args.target.starts_with("https://") {
        return Err(format!(
            "'target' must start with http:// or https://, got '{}'",
            args.target
        ));
    }
    if !WORDLIST_TYPES.contains(&args.wordlist_type.as_str()) {
        return Err(format!(
            "invalid wordlist_type '{}'; use one of: {}",
            args.wordlist_type,
            WORDLIST_TYPES.join(", ")
        ));
    }
    if args.extensions.trim().is_empty() {
        return Err("'extensions' must be non-empty, e.g. 'php,html,js,txt'".into());
    }
    if args.extensions.contains(' ') {
        return Err(format!(
            "'extensions' must be comma-separated without spaces, got '{}'",
            args.extensions
        ));
    }
    Ok(())
}

pub fn wordlist_path(dir: &Path, wordlist_type: &str) -> Option<PathBuf> {
    let path = dir.join(format!("{wordlist_type}.txt"));
    path.is_file().then_some(path)
}

pub fn build_command(
    target: &str,
    wordlist: &Path,
    output: &Path,
    extensions: &str,
) -> Vec<String> {
    let mut cmd = vec![
        "-w".to_string(),
        wordlist.to_string_lossy().into_owned(),
        "-u".to_string(),
        format!("{}/FUZZ", target.trim_end_matches('/')),
        "-o".to_string(),
        output.to_string_lossy().into_owned(),
    ];
    cmd.extend(
        ["-of", "json", "-t", "50", "-timeout", "10", "-mc", MATCH_CODES, "-fs", "0", "-ac"]
            .map(String::from),
    );
    if !extensions.trim().is_empty() {
        cmd.push("-e".into());
        cmd.push(extensions.to_string());
    }
    cmd
}

/// Findings from ffuf's JSON output. Entries that do not parse are skipped.
pub fn parse_results(json: &str) -> Vec<FfufFinding> {
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(json) else {
        if !json.trim().is_empty() {
            warn!("ffuf output is not valid JSON");
        }
        return Vec::new();
    };
    let Some(results) = doc.get("results").and_then(|r| r.as_array()) else {
        return Vec::new();
    };
    results
        .iter()
        .filter_map(|r| match serde_json::from_value::<FfufFinding>(r.clone()) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("Skipping malformed ffuf finding: {e}");
                None
            }
        })
        .collect()
}

/// The `ffuf_directory_scan` tool.
pub struct FfufScan {
    wordlist_dir: PathBuf,
    binary: String,
}

impl FfufScan {
    pub fn new(wordlist_dir: impl Into<PathBuf>) -> Self {
        Self {
            wordlist_dir: wordlist_dir.into(),
            binary: "ffuf".to_string(),
        }
    }

    /// Use a different ffuf executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn scan(&self, args: FfufArgs) -> FfufScanResult {
        if let Err(e) = validate_args(&args) {
            return FfufScanResult::error(&args, format!("validation error: {e}"));
        }
        let Some(wordlist) = wordlist_path(&self.wordlist_dir, &args.wordlist_type) else {
            return FfufScanResult::error(
                &args,
                format!(
                    "wordlist '{}' not found in {}",
                    args.wordlist_type,
                    self.wordlist_dir.display()
                ),
            );
        };
        let wordlist_size = count_lines(&wordlist).await;
        let output = match temp_output(".json") {
            Ok(f) => f,
            Err(e) => return FfufScanResult::error(&args, e),
        };

        let cmd = build_command(&args.target, &wordlist, output.path(), &args.extensions);
        let timeout = Duration::from_secs(args.timeout.unwrap_or(DEFAULT_FFUF_TIMEOUT_SECS));
        info!(
            url = %args.target,
            wordlist_size,
            "Starting ffuf scan: {} {}",
            self.binary,
            cmd.join(" ")
        );

        let process = match run_with_deadline(&self.binary, &cmd, timeout).await {
            Ok(p) => p,
            Err(e) => return FfufScanResult::error(&args, e),
        };
        let findings = parse_results(&read_output(output.path()).await);
        info!(findings = findings.len(), "Parsed ffuf output");

        FfufScanResult {
            count: findings.len(),
            findings,
            scan_completed: process.completed(),
            error: None,
            target: args.target,
            wordlist_type: args.wordlist_type,
            wordlist_size,
            extensions: args.extensions,
            scan_duration: Some(process.elapsed.as_secs_f64()),
        }
    }
}

impl Tool for FfufScan {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            super::FFUF_DIRECTORY_SCAN,
            "Discover hidden web directories and files using fuzzing wordlists. \
             Returns found paths with HTTP status codes and response sizes.",
            redline_rs::json_schema_for::<FfufArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            match parse_tool_args::<FfufArgs>(&arguments) {
                Ok(args) => self.scan(args).await.into_output(),
                Err(e) => ToolOutput::failed(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: &str, wordlist: &str, extensions: &str) -> FfufArgs {
        FfufArgs {
            target: target.into(),
            wordlist_type: wordlist.into(),
            extensions: extensions.into(),
            timeout: None,
        }
    }

    #[test]
    fn validation_catches_common_mistakes() {
        assert!(validate_args(&args("http://t", "common", "php,html")).is_ok());
        assert!(validate_args(&args("localhost:8000", "common", "php")).is_err());
        assert!(validate_args(&args("http://t", "big", "php")).is_err());
        let err = validate_args(&args("http://t", "small", "php, html")).unwrap_err();
        assert!(err.contains("without spaces"));
    }

    #[test]
    fn command_has_fuzz_url_and_extensions() {
        let cmd = build_command(
            "http://t/",
            Path::new("/w/common.txt"),
            Path::new("/tmp/out.json"),
            "php",
        );
        assert!(cmd.contains(&"http://t/FUZZ".to_string()));
        assert_eq!(&cmd[cmd.len() - 2..], &["-e".to_string(), "php".to_string()]);
        assert!(cmd.windows(2).any(|w| w[0] == "-mc" && w[1] == MATCH_CODES));
    }

    #[test]
    fn parses_findings_and_skips_broken_entries() {
        let json = r#"{"results":[
            {"url":"http://t/admin","status":403,"length":12,"words":2,"lines":1,"content-type":"text/html"},
            {"url":"http://t/broken"},
            {"url":"http://t/login","status":200,"length":512,"words":40,"lines":20,"redirectlocation":""}
        ]}"#;
        let findings = parse_results(json);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].content_type, "text/html");
        assert!(findings[0].is_interesting());
        assert_eq!(findings[1].status, 200);
        assert!(parse_results("").is_empty());
    }

    #[test]
    fn finds_wordlists_by_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.txt"), "admin\n").unwrap();
        assert!(wordlist_path(dir.path(), "small").is_some());
        assert!(wordlist_path(dir.path(), "common").is_none());
    }

    #[tokio::test]
    async fn invalid_target_is_a_failed_output() {
        let tool = FfufScan::new("/nonexistent");
        let output = tool
            .execute(r#"{"target":"ftp://t","wordlist_type":"common"}"#)
            .await;
        assert!(!output.success);
        assert!(output.to_content().starts_with("Error: validation error"));
        let payload: FfufScanResult = serde_json::from_str(&output.payload).unwrap();
        assert!(!payload.scan_completed);
    }

    #[tokio::test]
    async fn missing_wordlist_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let output = FfufScan::new(dir.path())
            .execute(r#"{"target":"http://t"}"#)
            .await;
        assert!(!output.success);
        assert!(output.error.unwrap().contains("wordlist 'common' not found"));
    }
}
