//! Structured summaries produced after each phase, and their markdown form.
//!
//! The summary types double as JSON schemas for the structured-output
//! calls, so field doc comments are what the model reads as descriptions.

use chrono::{DateTime, Utc};
use redline_rs::agent::Termination;
use redline_rs::budget::Severity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::target::Target;

// ── Scan summary ────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct DiscoveredEndpoint {
    /// Full URL of the endpoint.
    pub url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    /// Public, authentication required, or forbidden.
    pub access: String,
    /// What the endpoint does and what it exposes.
    pub notes: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct Technology {
    pub name: String,
    pub version: Option<String>,
    /// High, medium or low.
    pub confidence: String,
    /// Headers, files or responses the identification rests on.
    pub evidence: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct SensitiveInformation {
    /// Credentials, API keys, internal paths, user data, ...
    pub data_type: String,
    pub location: String,
    pub severity: Severity,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct Vulnerability {
    pub name: String,
    pub severity: Severity,
    pub description: String,
    pub affected_endpoint: Option<String>,
    pub cve_id: Option<String>,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct AttackRecommendation {
    pub vector: String,
    pub priority: Severity,
    /// Concrete requests or payloads to try, in order.
    pub steps: Vec<String>,
}

/// Reconnaissance phase outcome. Seeds the attack phase.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct ScanSummary {
    pub executive_summary: String,
    pub discovered_endpoints: Vec<DiscoveredEndpoint>,
    pub technology_stack: Vec<Technology>,
    pub sensitive_information: Vec<SensitiveInformation>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub attack_recommendations: Vec<AttackRecommendation>,
}

impl ScanSummary {
    pub fn to_markdown(&self) -> String {
        let mut md = vec!["# Reconnaissance Report".to_string(), String::new()];
        section(&mut md, "Executive Summary", &self.executive_summary);

        if !self.discovered_endpoints.is_empty() {
            md.push("## Discovered Endpoints".into());
            md.push(String::new());
            md.push("| URL | Status | Content-Type | Access | Notes |".into());
            md.push("|-----|--------|--------------|--------|-------|".into());
            for e in &self.discovered_endpoints {
                md.push(format!(
                    "| `{}` | {} | {} | {} | {} |",
                    e.url,
                    e.status_code.map_or("-".to_string(), |s| s.to_string()),
                    e.content_type.as_deref().unwrap_or("-"),
                    cell(&e.access),
                    cell(&e.notes),
                ));
            }
            md.push(String::new());
        }

        if !self.technology_stack.is_empty() {
            md.push("## Technology Stack".into());
            md.push(String::new());
            for t in &self.technology_stack {
                let version = t.version.as_deref().map(|v| format!(" {v}")).unwrap_or_default();
                md.push(format!(
                    "- **{}{version}** ({} confidence): {}",
                    t.name, t.confidence, t.evidence
                ));
            }
            md.push(String::new());
        }

        if !self.sensitive_information.is_empty() {
            md.push("## Sensitive Information".into());
            md.push(String::new());
            for s in &self.sensitive_information {
                md.push(format!("- [{}] {} at `{}`", s.severity, s.data_type, s.location));
            }
            md.push(String::new());
        }

        vulnerabilities(&mut md, &self.vulnerabilities);

        if !self.attack_recommendations.is_empty() {
            md.push("## Attack Recommendations".into());
            md.push(String::new());
            let mut recs: Vec<_> = self.attack_recommendations.iter().collect();
            recs.sort_by(|a, b| b.priority.cmp(&a.priority));
            for (i, r) in recs.iter().enumerate() {
                md.push(format!("### {}. {} ({})", i + 1, r.vector, r.priority));
                md.push(String::new());
                for step in &r.steps {
                    md.push(format!("- `{step}`"));
                }
                md.push(String::new());
            }
        }
        md.join("\n")
    }
}

// ── Attack summary ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct ExploitAttempt {
    /// Attack technique or exploit method used.
    pub technique: String,
    pub target_endpoint: String,
    /// The payload or attack vector as sent.
    pub payload: String,
    pub success: bool,
    /// Response details proving the outcome.
    pub response_details: String,
    pub impact_assessment: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct CompromisedAsset {
    /// Endpoint, service, account, ...
    pub asset_type: String,
    pub location: String,
    /// Read, write, admin or full.
    pub access_level: String,
    pub evidence: String,
    pub persistence_method: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct SecurityBypass {
    pub control_type: String,
    pub bypass_method: String,
    /// High, medium or low.
    pub effectiveness: String,
    pub detection_risk: String,
}

/// Exploitation phase outcome.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct AttackReportSummary {
    pub exploit_attempts: Vec<ExploitAttempt>,
    pub compromised_assets: Vec<CompromisedAsset>,
    pub security_bypasses: Vec<SecurityBypass>,
    /// Chronological account of the attack.
    pub attack_timeline: String,
    pub impact_summary: String,
    pub recommendations: String,
}

impl AttackReportSummary {
    pub fn successful_attempts(&self) -> impl Iterator<Item = &ExploitAttempt> {
        self.exploit_attempts.iter().filter(|a| a.success)
    }

    pub fn to_markdown(&self) -> String {
        let mut md = vec!["# Attack Execution Report".to_string(), String::new()];
        section(&mut md, "Executive Summary", &self.impact_summary);
        section(&mut md, "Attack Timeline", &self.attack_timeline);

        if !self.exploit_attempts.is_empty() {
            md.push("## Exploit Attempts".into());
            md.push(String::new());
            for (i, a) in self.exploit_attempts.iter().enumerate() {
                let outcome = if a.success { "succeeded" } else { "failed" };
                md.push(format!("### {}. {} ({outcome})", i + 1, a.technique));
                md.push(String::new());
                md.push(format!("**Target:** `{}`", a.target_endpoint));
                md.push(String::new());
                md.push(format!("**Payload:** `{}`", a.payload));
                md.push(String::new());
                md.push(format!("**Response:** {}", a.response_details));
                md.push(String::new());
                md.push(format!("**Impact:** {}", a.impact_assessment));
                md.push(String::new());
            }
        }

        if !self.compromised_assets.is_empty() {
            md.push("## Compromised Assets".into());
            md.push(String::new());
            for c in &self.compromised_assets {
                md.push(format!("### {} ({} access)", c.asset_type, c.access_level));
                md.push(String::new());
                md.push(format!("**Location:** `{}`", c.location));
                md.push(String::new());
                md.push(format!("**Evidence:** {}", c.evidence));
                md.push(String::new());
                md.push(format!("**Persistence:** {}", c.persistence_method));
                md.push(String::new());
            }
        }

        if !self.security_bypasses.is_empty() {
            md.push("## Security Bypasses".into());
            md.push(String::new());
            for b in &self.security_bypasses {
                md.push(format!(
                    "- **{}**: {} (effectiveness {}, detection risk {})",
                    b.control_type, b.bypass_method, b.effectiveness, b.detection_risk
                ));
            }
            md.push(String::new());
        }

        section(&mut md, "Recommendations", &self.recommendations);
        md.join("\n")
    }
}

// ── Final assessment ────────────────────────────────────────────────

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct RemediationItem {
    pub priority: Severity,
    /// Immediate, short-term or long-term.
    pub timeframe: String,
    pub description: String,
}

/// Synthesis of both phases.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct AssessmentReport {
    pub overall_risk: Severity,
    pub executive_summary: String,
    /// Vulnerabilities confirmed by reconnaissance or exploitation.
    pub confirmed_vulnerabilities: Vec<Vulnerability>,
    /// How reconnaissance findings led to each successful exploit.
    pub exploitation_chains: Vec<String>,
    pub remediation_plan: Vec<RemediationItem>,
}

impl AssessmentReport {
    pub fn to_markdown(&self) -> String {
        let mut md = vec![
            "# Security Assessment".to_string(),
            String::new(),
            format!("**Overall risk:** {}", self.overall_risk),
            String::new(),
        ];
        section(&mut md, "Executive Summary", &self.executive_summary);
        vulnerabilities(&mut md, &self.confirmed_vulnerabilities);

        if !self.exploitation_chains.is_empty() {
            md.push("## Exploitation Chains".into());
            md.push(String::new());
            md.extend(self.exploitation_chains.iter().map(|c| format!("- {c}")));
            md.push(String::new());
        }

        if !self.remediation_plan.is_empty() {
            md.push("## Remediation Plan".into());
            md.push(String::new());
            let mut items: Vec<_> = self.remediation_plan.iter().collect();
            items.sort_by(|a, b| b.priority.cmp(&a.priority));
            for r in items {
                md.push(format!("- [{}] ({}) {}", r.priority, r.timeframe, r.description));
            }
            md.push(String::new());
        }
        md.join("\n")
    }
}

// ── Run outcome ─────────────────────────────────────────────────────

/// Budget and cost figures for one phase.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PhaseStats {
    pub phase: String,
    pub rounds_used: u32,
    pub tool_calls: u32,
    pub failed_calls: usize,
    #[serde(skip)]
    pub termination: Option<Termination>,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl PhaseStats {
    fn termination_label(&self) -> &'static str {
        match self.termination {
            Some(Termination::Terminal) => "completed",
            Some(Termination::RoundLimit) => "round limit",
            Some(Termination::Cancelled) => "cancelled",
            None => "-",
        }
    }
}

/// Everything one assessment produced. Later phases are `None` when an
/// earlier one was cancelled or the run was limited to one phase.
#[derive(Clone, Debug)]
pub struct AssessmentOutcome {
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scan: Option<ScanSummary>,
    pub attack: Option<AttackReportSummary>,
    pub assessment: Option<AssessmentReport>,
    pub phases: Vec<PhaseStats>,
    pub cancelled: bool,
}

impl AssessmentOutcome {
    pub fn estimated_cost_usd(&self) -> f64 {
        self.phases.iter().map(|p| p.estimated_cost_usd).sum()
    }

    pub fn to_markdown(&self) -> String {
        let mut md = vec![
            format!("# Assessment of {}", self.target.url),
            String::new(),
            format!("- **Target:** {} ({})", self.target.url, self.target.kind),
            format!("- **Description:** {}", self.target.description),
            format!(
                "- **Run:** {} to {}",
                self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                self.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            format!("- **Estimated cost:** ${:.4}", self.estimated_cost_usd()),
        ];
        if self.cancelled {
            md.push("- **Status:** cancelled, results are partial".into());
        }
        md.push(String::new());

        if !self.phases.is_empty() {
            md.push("| Phase | Rounds | Tool calls | Failed | Ended by | Tokens |".into());
            md.push("|-------|--------|------------|--------|----------|--------|".into());
            for p in &self.phases {
                md.push(format!(
                    "| {} | {} | {} | {} | {} | {} |",
                    p.phase,
                    p.rounds_used,
                    p.tool_calls,
                    p.failed_calls,
                    p.termination_label(),
                    p.total_tokens
                ));
            }
            md.push(String::new());
        }

        // Headings of the embedded reports drop one level.
        for body in [
            self.assessment.as_ref().map(AssessmentReport::to_markdown),
            self.scan.as_ref().map(ScanSummary::to_markdown),
            self.attack.as_ref().map(AttackReportSummary::to_markdown),
        ]
        .into_iter()
        .flatten()
        {
            md.extend(body.lines().map(demote));
            md.push(String::new());
        }
        md.join("\n")
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn section(md: &mut Vec<String>, title: &str, body: &str) {
    if body.trim().is_empty() {
        return;
    }
    md.push(format!("## {title}"));
    md.push(String::new());
    md.push(body.trim().to_string());
    md.push(String::new());
}

fn vulnerabilities(md: &mut Vec<String>, vulns: &[Vulnerability]) {
    if vulns.is_empty() {
        return;
    }
    md.push("## Vulnerabilities".into());
    md.push(String::new());
    let mut sorted: Vec<_> = vulns.iter().collect();
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
    for v in sorted {
        let cve = v.cve_id.as_deref().map(|c| format!(" ({c})")).unwrap_or_default();
        md.push(format!("### [{}] {}{cve}", v.severity, v.name));
        md.push(String::new());
        if let Some(endpoint) = &v.affected_endpoint {
            md.push(format!("**Affected:** `{endpoint}`"));
            md.push(String::new());
        }
        md.push(v.description.clone());
        md.push(String::new());
    }
}

/// Keep table cells on one line.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn demote(line: &str) -> String {
    if line.starts_with('#') {
        format!("#{line}")
    } else {
        line.to_string()
    }
}
