//! Reconnaissance and attack tools.
//!
//! Provides the ffuf, curl and nmap wrappers, the [`ReconToolsExt`] trait
//! for registering them on a [`ToolSet`], and [`recon_catalog`], which tags
//! each tool with the phases allowed to call it.

pub mod curl;
pub mod ffuf;
pub mod nmap;
pub mod process;

use std::path::PathBuf;

use redline_rs::budget::{
    Capability, CatalogTool, FindingClassifier, FindingSummary, Severity, ToolCatalog,
};
use redline_rs::tools::core::ToolSet;
use serde_json::{Map, Value};

pub use curl::{Curl, CurlResult};
pub use ffuf::{FfufFinding, FfufScan, FfufScanResult};
pub use nmap::{NmapScan, NmapScanResult, ScanType};

// ── Tool name constants ─────────────────────────────────────────────

pub const FFUF_DIRECTORY_SCAN: &str = "ffuf_directory_scan";
pub const CURL_TOOL: &str = "curl_tool";
pub const NMAP_PORT_SCAN: &str = "nmap_port_scan";

// ── Extension trait ─────────────────────────────────────────────────

/// Register the recon tools on a [`ToolSet`].
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_timeouts(ToolTimeouts::new(Duration::from_secs(300)))
///     .with_recon_tools("wordlists", true);
/// ```
pub trait ReconToolsExt {
    fn with_recon_tools(self, wordlist_dir: impl Into<PathBuf>, nmap: bool) -> Self;
}

impl ReconToolsExt for ToolSet {
    fn with_recon_tools(self, wordlist_dir: impl Into<PathBuf>, nmap: bool) -> Self {
        self.with(FfufScan::new(wordlist_dir))
            .with(Curl::new())
            .with_if(nmap, NmapScan::new())
    }
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Catalog entries for the recon tools. curl is the only tool the attack
/// phase may call.
pub fn recon_catalog(nmap: bool) -> Result<ToolCatalog, String> {
    let mut tools = vec![
        CatalogTool::new(
            FFUF_DIRECTORY_SCAN,
            [Capability::Scan],
            "Wordlist-driven discovery of hidden directories and files",
        ),
        CatalogTool::new(
            CURL_TOOL,
            [Capability::Scan, Capability::Attack],
            "Arbitrary HTTP requests with custom methods, headers and payloads",
        ),
    ];
    if nmap {
        tools.push(CatalogTool::new(
            NMAP_PORT_SCAN,
            [Capability::Scan],
            "Port scan with service and version detection",
        ));
    }
    ToolCatalog::new(tools)
}

// ── Classifier ──────────────────────────────────────────────────────

/// Paths that usually should not be reachable from outside.
const SENSITIVE_PATHS: &[&str] = &[
    ".env", ".git", "backup", ".bak", ".sql", "config", "admin", "phpinfo", "debug",
];

/// Response fragments that indicate a successful injection or leak.
const LEAK_MARKERS: &[&str] = &[
    "root:x:0:0",
    "SQL syntax",
    "sqlite3.OperationalError",
    "Traceback (most recent call last)",
    "\"password\"",
    "BEGIN RSA PRIVATE KEY",
];

/// Attaches a first-pass severity to recon results as they enter the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconClassifier;

impl FindingClassifier for ReconClassifier {
    fn classify(
        &self,
        tool_name: &str,
        _arguments: Option<&Map<String, Value>>,
        raw_result: &str,
        success: bool,
    ) -> Option<FindingSummary> {
        if !success {
            return None;
        }
        match tool_name {
            FFUF_DIRECTORY_SCAN => classify_ffuf(raw_result),
            CURL_TOOL => classify_curl(raw_result),
            NMAP_PORT_SCAN => classify_nmap(raw_result),
            _ => None,
        }
    }
}

fn classify_ffuf(raw: &str) -> Option<FindingSummary> {
    let result: FfufScanResult = serde_json::from_str(raw).ok()?;
    if result.findings.is_empty() {
        return None;
    }
    let sensitive: Vec<&str> = result
        .findings
        .iter()
        .filter(|f| f.status == 200 && SENSITIVE_PATHS.iter().any(|p| f.url.contains(p)))
        .map(|f| f.url.as_str())
        .collect();
    let interesting = result.findings.iter().filter(|f| f.is_interesting()).count();

    Some(if sensitive.is_empty() {
        FindingSummary {
            severity: if interesting > 0 { Severity::Low } else { Severity::Info },
            description: format!(
                "{} paths discovered, {interesting} worth following up",
                result.count
            ),
        }
    } else {
        FindingSummary {
            severity: Severity::Medium,
            description: format!("sensitive paths reachable: {}", sensitive.join(", ")),
        }
    })
}

fn classify_curl(raw: &str) -> Option<FindingSummary> {
    let result: CurlResult = serde_json::from_str(raw).ok()?;
    if let Some(marker) = LEAK_MARKERS.iter().find(|m| result.content.contains(*m)) {
        return Some(FindingSummary {
            severity: Severity::High,
            description: format!("response contains '{marker}'"),
        });
    }
    let status = status_code(&result.content)?;
    let severity = match status {
        500..=599 => Severity::Low,
        _ => Severity::Info,
    };
    Some(FindingSummary {
        severity,
        description: format!("HTTP {status}"),
    })
}

fn classify_nmap(raw: &str) -> Option<FindingSummary> {
    let result: NmapScanResult = serde_json::from_str(raw).ok()?;
    let open: Vec<String> = result
        .hosts
        .iter()
        .flat_map(|h| h.open_ports())
        .map(|p| format!("{}/{} ({})", p.port, p.protocol, p.service))
        .collect();
    (!open.is_empty()).then(|| FindingSummary {
        severity: Severity::Info,
        description: format!("open ports: {}", open.join(", ")),
    })
}

/// Status of the last response in `curl -i` output. Redirects followed
/// with `-L` produce several status lines.
fn status_code(content: &str) -> Option<u16> {
    content
        .lines()
        .filter(|l| l.starts_with("HTTP/"))
        .last()?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_rs::budget::Scope;

    #[test]
    fn catalog_scopes() {
        let catalog = recon_catalog(true).unwrap();
        assert_eq!(
            catalog.names_in_scope(Scope::Only(Capability::Scan)),
            vec![FFUF_DIRECTORY_SCAN, CURL_TOOL, NMAP_PORT_SCAN]
        );
        assert_eq!(
            catalog.names_in_scope(Scope::Only(Capability::Attack)),
            vec![CURL_TOOL]
        );
        assert!(!recon_catalog(false).unwrap().contains(NMAP_PORT_SCAN));
    }

    #[test]
    fn tool_set_matches_catalog() {
        let tools = ToolSet::new().with_recon_tools("wordlists", false);
        assert_eq!(tools.names(), vec![CURL_TOOL, FFUF_DIRECTORY_SCAN]);
        let defs = tools.definitions();
        assert!(defs.iter().all(|d| !d.function.description.is_empty()));
    }

    #[test]
    fn curl_leak_is_high() {
        let raw = serde_json::json!({
            "command": "curl -i http://t/download?file=../../etc/passwd",
            "content": "HTTP/1.1 200 OK\r\n\r\nroot:x:0:0:root:/root:/bin/bash",
            "exit_code": 0,
            "execution_time": 0.1,
            "timestamp": "2026-01-01T00:00:00Z",
        })
        .to_string();
        let summary = ReconClassifier.classify(CURL_TOOL, None, &raw, true).unwrap();
        assert_eq!(summary.severity, Severity::High);
    }

    #[test]
    fn curl_status_from_last_response() {
        let content = "HTTP/1.1 302 Found\r\nLocation: /x\r\n\r\nHTTP/1.1 503 Service Unavailable\r\n";
        assert_eq!(status_code(content), Some(503));
        assert_eq!(status_code("curl: (7) Failed to connect"), None);
    }

    #[test]
    fn ffuf_sensitive_paths_are_medium() {
        let raw = serde_json::json!({
            "findings": [
                {"url": "http://t/.env", "status": 200, "length": 80, "words": 4, "lines": 4},
                {"url": "http://t/about", "status": 301, "length": 0, "words": 0, "lines": 0},
            ],
            "count": 2,
            "scan_completed": true,
            "target": "http://t",
            "wordlist_type": "common",
            "wordlist_size": 4700,
            "extensions": "php",
        })
        .to_string();
        let summary = ReconClassifier
            .classify(FFUF_DIRECTORY_SCAN, None, &raw, true)
            .unwrap();
        assert_eq!(summary.severity, Severity::Medium);
        assert!(summary.description.contains("http://t/.env"));
    }

    #[test]
    fn failures_and_foreign_tools_are_unclassified() {
        assert!(ReconClassifier.classify(CURL_TOOL, None, "Error: boom", false).is_none());
        assert!(ReconClassifier.classify("nikto", None, "{}", true).is_none());
        assert!(ReconClassifier.classify(CURL_TOOL, None, "not json", true).is_none());
    }
}
