//! Behavior prompts for each phase and summary step.
//!
//! The harness wraps the phase prompts in its reasoning-context template
//! (tools, usage, limits, previous results), so these only describe what
//! the phase is for.

use crate::target::Target;

/// Reconnaissance phase. Information gathering only.
pub fn scan_behavior_prompt(target: &Target) -> String {
    format!(
        "\
# Reconnaissance Specialist

{target}

Your only job is information gathering and vulnerability identification. \
No exploitation, no payload testing, no credential guessing.

## Method
1. Start broad: enumerate directories and files, probe the root and any API docs. \
Port scans go against `{host}`.
2. Identify the technology stack from headers, error pages and discovered files.
3. Let each result pick the next probe. Never repeat a scan with identical parameters.
4. Record every endpoint, its status code, and what it reveals.

## Tool calls
Your calls are budgeted. <CALLING_LIMITS> shows the limits and <TOOLS_USAGE> \
what you have used. Calls beyond a limit are not executed. When you have \
nothing left worth probing, answer without calling a tool.",
        target = target.to_prompt(),
        host = target.host()
    )
}

/// Exploitation phase, seeded with the reconnaissance summary.
pub fn attack_behavior_prompt(target: &Target, scan_summary: &str) -> String {
    format!(
        "\
# Attack Execution Specialist

{target}

## Reconnaissance summary
{scan_summary}

## Method
1. Work through the attack recommendations in priority order.
2. Craft payloads from the reconnaissance data: injection, authentication \
bypass, path traversal, insecure direct object references, file upload.
3. Escalate only from confirmed footholds.
4. Keep the response of every successful exploit as evidence.

## Constraints
- Demonstrate impact without damaging the target.
- curl is your only tool. Quote its arguments as a shell would.
- Calls are budgeted; see <CALLING_LIMITS> and <TOOLS_USAGE>. Stop calling \
tools when no promising vector remains.",
        target = target.to_prompt()
    )
}

/// Structured summary of the reconnaissance ledger.
pub fn scan_summary_prompt(target: &Target) -> String {
    format!(
        "\
# Reconnaissance Analysis

{target}

The user message holds every tool result recorded during reconnaissance. \
Produce a ScanSummary:
- discovered endpoints with status code, content type and access control
- technology stack with the evidence behind each entry
- sensitive information exposed, and where
- suspected vulnerabilities with severity
- attack recommendations for the exploitation phase, ranked by likelihood of success
- a short executive summary

Report only what the results support.",
        target = target.to_prompt()
    )
}

/// Structured summary of the attack ledger.
pub fn attack_summary_prompt(target: &Target) -> String {
    format!(
        "\
# Attack Report

{target}

The user message holds every tool result recorded during exploitation. \
Produce an AttackReportSummary: each exploit attempt with technique, \
endpoint, payload, outcome and evidence; compromised assets; bypassed \
security controls; a timeline; an impact summary; recommendations. \
Mark an attempt successful only when the response proves it.",
        target = target.to_prompt()
    )
}

/// Final synthesis across both phases.
pub fn assessment_prompt(target: &Target, scan_summary: &str, attack_summary: &str) -> String {
    format!(
        "\
# Security Assessment

{target}

## Reconnaissance
{scan_summary}

## Exploitation
{attack_summary}

Combine both phases into an AssessmentReport. Rate the overall risk, list \
confirmed vulnerabilities ordered by severity, tie each successful exploit \
back to the reconnaissance finding that enabled it, and give a prioritized \
remediation plan.",
        target = target.to_prompt()
    )
}

/// User message carrying a phase ledger into a summary call.
pub fn ledger_message(phase: &str, ledger: &serde_json::Value) -> String {
    let results = serde_json::to_string_pretty(ledger).unwrap_or_else(|_| "[]".to_string());
    format!("Tool results from the {phase} phase:\n\n{results}")
}

/// The task message a phase run starts from.
pub fn phase_task(phase: &str, target: &Target) -> String {
    format!("Begin the {phase} phase against {}.", target.url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::web("http://localhost:8000", "FastAPI demo").unwrap()
    }

    #[test]
    fn prompts_name_the_target() {
        let t = target();
        for prompt in [
            scan_behavior_prompt(&t),
            attack_behavior_prompt(&t, "{}"),
            scan_summary_prompt(&t),
            attack_summary_prompt(&t),
            assessment_prompt(&t, "{}", "{}"),
        ] {
            assert!(prompt.contains("TARGET: http://localhost:8000"));
            assert!(prompt.contains("DESCRIPTION: FastAPI demo"));
        }
        assert!(scan_behavior_prompt(&t).contains("`localhost`"));
    }

    #[test]
    fn attack_prompt_embeds_scan_summary() {
        let prompt = attack_behavior_prompt(&target(), "admin panel at /admin");
        assert!(prompt.contains("admin panel at /admin"));
    }

    #[test]
    fn ledger_message_is_pretty_json() {
        let msg = ledger_message("scan", &serde_json::json!([{"call_id": "a"}]));
        assert!(msg.starts_with("Tool results from the scan phase"));
        assert!(msg.contains("\"call_id\": \"a\""));
    }
}
