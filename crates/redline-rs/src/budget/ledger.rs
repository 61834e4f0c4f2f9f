//! Append-only record of observed tool results, keyed by call id.

use super::catalog::ToolCatalog;
use super::usage::UsageTracker;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(
    Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Structured reading of a single tool result.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct FindingSummary {
    pub severity: Severity,
    pub description: String,
}

/// One observed tool invocation. Never modified after creation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    /// Arguments of the originating request, or `None` when no request
    /// carrying this call id was found.
    pub arguments: Option<serde_json::Map<String, serde_json::Value>>,
    pub raw_result: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_summary: Option<FindingSummary>,
}

/// Derives a [`FindingSummary`] from a result as it is first recorded.
pub trait FindingClassifier: Send + Sync {
    fn classify(
        &self,
        tool_name: &str,
        arguments: Option<&serde_json::Map<String, serde_json::Value>>,
        raw_result: &str,
        success: bool,
    ) -> Option<FindingSummary>;
}

/// Outcome of one [`ToolResultLedger::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Call ids appended, in merge order.
    pub accepted: Vec<String>,
    /// Records skipped because their call id was already present.
    pub duplicates: usize,
    /// Accepted records naming a tool absent from the catalog.
    pub unknown_tools: Vec<String>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Deduplicated, insertion-ordered store of [`ToolCallRecord`]s for one run.
#[derive(Debug, Clone, Default)]
pub struct ToolResultLedger {
    records: Vec<ToolCallRecord>,
    seen: HashSet<String>,
}

impl ToolResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.seen.contains(call_id)
    }

    pub fn seen_call_ids(&self) -> &HashSet<String> {
        &self.seen
    }

    /// Append every record whose call id is new, counting each one exactly
    /// once against `usage`. Records already present are skipped and do not
    /// touch the counters.
    pub fn merge(
        &mut self,
        records: Vec<ToolCallRecord>,
        usage: &mut UsageTracker,
        catalog: &ToolCatalog,
    ) -> MergeReport {
        let mut report = MergeReport::default();

        for record in records {
            if self.seen.contains(&record.call_id) {
                report.duplicates += 1;
                continue;
            }
            if !catalog.contains(&record.tool_name) {
                warn!(
                    call_id = %record.call_id,
                    tool = %record.tool_name,
                    "Result for tool outside the catalog; counted under its own name"
                );
                report.unknown_tools.push(record.tool_name.clone());
            }
            usage.increment(&record.tool_name);
            debug!(
                call_id = %record.call_id,
                tool = %record.tool_name,
                success = record.success,
                "Recorded tool result"
            );
            self.seen.insert(record.call_id.clone());
            report.accepted.push(record.call_id.clone());
            self.records.push(record);
        }

        if report.duplicates > 0 {
            debug!(duplicates = report.duplicates, "Skipped already-recorded results");
        }
        report
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    pub fn records_for<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a ToolCallRecord> {
        self.records.iter().filter(move |r| r.tool_name == tool)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialized form embedded in the reasoning context and summary prompts.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.records).unwrap_or(serde_json::Value::Array(Vec::new()))
    }

    pub fn into_records(self) -> Vec<ToolCallRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::catalog::{Capability, CatalogTool};
    use crate::budget::usage::UsageLimits;

    fn record(call_id: &str, tool: &str) -> ToolCallRecord {
        ToolCallRecord {
            call_id: call_id.into(),
            tool_name: tool.into(),
            arguments: None,
            raw_result: format!("{tool} output"),
            success: true,
            derived_summary: None,
        }
    }

    fn catalog() -> ToolCatalog {
        ToolCatalog::new(vec![
            CatalogTool::new("ffuf_directory_scan", [Capability::Scan], "fuzz"),
            CatalogTool::new("curl_tool", [Capability::Scan, Capability::Attack], "http"),
        ])
        .unwrap()
    }

    #[test]
    fn merge_counts_each_new_record_once() {
        let catalog = catalog();
        let mut usage = UsageTracker::new(UsageLimits::new(20));
        let mut ledger = ToolResultLedger::new();

        let report = ledger.merge(
            vec![
                record("a", "curl_tool"),
                record("b", "ffuf_directory_scan"),
                record("c", "curl_tool"),
            ],
            &mut usage,
            &catalog,
        );

        assert_eq!(report.accepted, vec!["a", "b", "c"]);
        assert_eq!(usage.counters().global(), 3);
        assert_eq!(usage.counters().count_for("curl_tool"), 2);
        assert_eq!(usage.counters().count_for("ffuf_directory_scan"), 1);
        assert_eq!(ledger.records_for("curl_tool").count(), 2);
    }

    #[test]
    fn duplicate_call_id_is_a_no_op() {
        let catalog = catalog();
        let mut usage = UsageTracker::new(UsageLimits::new(20));
        let mut ledger = ToolResultLedger::new();

        ledger.merge(vec![record("abc123", "curl_tool")], &mut usage, &catalog);
        let before = usage.counters().clone();

        let report = ledger.merge(vec![record("abc123", "curl_tool")], &mut usage, &catalog);
        assert!(report.is_empty());
        assert_eq!(report.duplicates, 1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(usage.counters(), &before);
    }

    #[test]
    fn duplicate_within_one_batch_keeps_first() {
        let catalog = catalog();
        let mut usage = UsageTracker::new(UsageLimits::new(20));
        let mut ledger = ToolResultLedger::new();

        let mut second = record("x", "curl_tool");
        second.raw_result = "later".into();
        let report = ledger.merge(vec![record("x", "curl_tool"), second], &mut usage, &catalog);

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(ledger.records()[0].raw_result, "curl_tool output");
        assert_eq!(usage.counters().global(), 1);
    }

    #[test]
    fn unknown_tool_is_reported_and_counted_globally() {
        let catalog = catalog();
        let mut usage = UsageTracker::new(UsageLimits::new(20));
        let mut ledger = ToolResultLedger::new();

        let report = ledger.merge(vec![record("u", "sqlmap")], &mut usage, &catalog);
        assert_eq!(report.unknown_tools, vec!["sqlmap"]);
        assert_eq!(usage.counters().global(), 1);
        assert_eq!(usage.counters().count_for("curl_tool"), 0);
        assert!(ledger.contains("u"));
    }

    #[test]
    fn to_json_omits_missing_summary() {
        let catalog = catalog();
        let mut usage = UsageTracker::new(UsageLimits::new(20));
        let mut ledger = ToolResultLedger::new();
        let mut flagged = record("f", "curl_tool");
        flagged.derived_summary = Some(FindingSummary {
            severity: Severity::High,
            description: "admin panel exposed".into(),
        });
        ledger.merge(vec![record("p", "curl_tool"), flagged], &mut usage, &catalog);

        let json = ledger.to_json();
        assert!(json[0].get("derived_summary").is_none());
        assert_eq!(json[1]["derived_summary"]["severity"], "high");
        assert_eq!(json[0]["arguments"], serde_json::Value::Null);
    }

    #[test]
    fn severity_orders_by_impact() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Info < Severity::Low);
    }
}
