//! Per-tool and global call counters checked against configured limits.

use super::catalog::ToolCatalog;
use serde::Serialize;
use std::collections::BTreeMap;

/// Limit applied to a tool with no explicit entry.
pub const DEFAULT_TOOL_LIMIT: u32 = 3;

/// Call limits for one run. Fixed once the run starts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UsageLimits {
    per_tool: BTreeMap<String, u32>,
    global_limit: u32,
    default_limit: u32,
}

impl UsageLimits {
    pub fn new(global_limit: u32) -> Self {
        Self {
            per_tool: BTreeMap::new(),
            global_limit,
            default_limit: DEFAULT_TOOL_LIMIT,
        }
    }

    pub fn with_tool_limit(mut self, tool: impl Into<String>, limit: u32) -> Self {
        self.per_tool.insert(tool.into(), limit);
        self
    }

    pub fn with_tool_limits<I, S>(mut self, limits: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        self.per_tool
            .extend(limits.into_iter().map(|(name, limit)| (name.into(), limit)));
        self
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    /// Effective limit for `tool`.
    pub fn limit_for(&self, tool: &str) -> u32 {
        self.per_tool
            .get(tool)
            .copied()
            .unwrap_or(self.default_limit)
    }

    pub fn global_limit(&self) -> u32 {
        self.global_limit
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn per_tool(&self) -> &BTreeMap<String, u32> {
        &self.per_tool
    }

    /// Reject per-tool limits naming tools the catalog does not contain.
    pub fn validate_against(&self, catalog: &ToolCatalog) -> Result<(), String> {
        let unknown: Vec<&str> = self
            .per_tool
            .keys()
            .map(String::as_str)
            .filter(|name| !catalog.contains(name))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "limits configured for tools not in the catalog: {}",
                unknown.join(", ")
            ))
        }
    }
}

/// Monotonic call counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct UsageCounters {
    per_tool: BTreeMap<String, u32>,
    global: u32,
}

impl UsageCounters {
    pub fn count_for(&self, tool: &str) -> u32 {
        self.per_tool.get(tool).copied().unwrap_or(0)
    }

    pub fn global(&self) -> u32 {
        self.global
    }

    pub fn per_tool(&self) -> &BTreeMap<String, u32> {
        &self.per_tool
    }
}

/// Usage of a single tool as shown to the reasoning step.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolUsage {
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub exhausted: bool,
}

/// Serializable view of a tracker.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub global_count: u32,
    pub global_limit: u32,
    pub global_exhausted: bool,
    pub default_limit: u32,
    pub tools: BTreeMap<String, ToolUsage>,
}

/// Counters plus the limits they are checked against.
///
/// Owned by exactly one run. Duplicate suppression happens before
/// [`increment`](Self::increment) is called; the tracker counts whatever
/// it is given.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    limits: UsageLimits,
    counters: UsageCounters,
}

impl UsageTracker {
    pub fn new(limits: UsageLimits) -> Self {
        Self {
            limits,
            counters: UsageCounters::default(),
        }
    }

    /// Count one observed call of `tool` against its own and the global budget.
    pub fn increment(&mut self, tool: &str) {
        let count = self.counters.per_tool.entry(tool.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        self.counters.global = self.counters.global.saturating_add(1);
    }

    pub fn is_tool_exhausted(&self, tool: &str) -> bool {
        self.counters.count_for(tool) >= self.limits.limit_for(tool)
    }

    pub fn is_global_exhausted(&self) -> bool {
        self.counters.global >= self.limits.global_limit
    }

    /// True when every named tool is exhausted. An empty set is exhausted.
    pub fn all_exhausted<'a>(&self, tools: impl IntoIterator<Item = &'a str>) -> bool {
        tools.into_iter().all(|t| self.is_tool_exhausted(t))
    }

    /// Calls left for `tool` before its own limit.
    pub fn remaining(&self, tool: &str) -> u32 {
        self.limits
            .limit_for(tool)
            .saturating_sub(self.counters.count_for(tool))
    }

    pub fn global_remaining(&self) -> u32 {
        self.limits
            .global_limit
            .saturating_sub(self.counters.global)
    }

    pub fn counters(&self) -> &UsageCounters {
        &self.counters
    }

    pub fn limits(&self) -> &UsageLimits {
        &self.limits
    }

    /// Snapshot covering `tools` plus every tool that has been counted.
    pub fn snapshot<'a>(&self, tools: impl IntoIterator<Item = &'a str>) -> UsageSnapshot {
        let mut names: Vec<&str> = tools.into_iter().collect();
        names.extend(self.counters.per_tool.keys().map(String::as_str));

        let tools = names
            .into_iter()
            .map(|name| {
                let usage = ToolUsage {
                    count: self.counters.count_for(name),
                    limit: self.limits.limit_for(name),
                    remaining: self.remaining(name),
                    exhausted: self.is_tool_exhausted(name),
                };
                (name.to_string(), usage)
            })
            .collect();

        UsageSnapshot {
            global_count: self.counters.global,
            global_limit: self.limits.global_limit,
            global_exhausted: self.is_global_exhausted(),
            default_limit: self.limits.default_limit,
            tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::catalog::{Capability, CatalogTool};

    fn limits() -> UsageLimits {
        UsageLimits::new(20)
            .with_tool_limit("ffuf_directory_scan", 2)
            .with_tool_limit("curl_tool", 5)
    }

    #[test]
    fn unlisted_tool_uses_default_limit() {
        let tracker = UsageTracker::new(limits());
        assert_eq!(tracker.limits().limit_for("nmap_port_scan"), DEFAULT_TOOL_LIMIT);
        assert_eq!(tracker.remaining("nmap_port_scan"), 3);

        let custom = UsageLimits::new(5).with_default_limit(1);
        assert_eq!(custom.limit_for("anything"), 1);
    }

    #[test]
    fn tool_exhaustion_is_per_tool() {
        let mut tracker = UsageTracker::new(limits());
        tracker.increment("ffuf_directory_scan");
        assert!(!tracker.is_tool_exhausted("ffuf_directory_scan"));
        tracker.increment("ffuf_directory_scan");
        assert!(tracker.is_tool_exhausted("ffuf_directory_scan"));
        assert!(!tracker.is_tool_exhausted("curl_tool"));
        assert_eq!(tracker.counters().global(), 2);
    }

    #[test]
    fn global_exhaustion() {
        let mut tracker = UsageTracker::new(UsageLimits::new(2));
        tracker.increment("a");
        assert!(!tracker.is_global_exhausted());
        tracker.increment("b");
        assert!(tracker.is_global_exhausted());
        assert_eq!(tracker.global_remaining(), 0);
    }

    #[test]
    fn zero_limits_start_exhausted() {
        let tracker = UsageTracker::new(UsageLimits::new(0).with_tool_limit("curl_tool", 0));
        assert!(tracker.is_global_exhausted());
        assert!(tracker.is_tool_exhausted("curl_tool"));
    }

    #[test]
    fn all_exhausted_requires_every_tool() {
        let mut tracker = UsageTracker::new(limits());
        tracker.increment("ffuf_directory_scan");
        tracker.increment("ffuf_directory_scan");
        assert!(!tracker.all_exhausted(["ffuf_directory_scan", "curl_tool"]));
        assert!(tracker.all_exhausted(["ffuf_directory_scan"]));
        assert!(tracker.all_exhausted(std::iter::empty()));
    }

    #[test]
    fn snapshot_includes_counted_tools_outside_the_list() {
        let mut tracker = UsageTracker::new(limits());
        tracker.increment("curl_tool");
        tracker.increment("mystery_tool");
        let snap = tracker.snapshot(["ffuf_directory_scan", "curl_tool"]);
        assert_eq!(snap.global_count, 2);
        assert_eq!(snap.tools.len(), 3);
        assert_eq!(snap.tools["curl_tool"].remaining, 4);
        assert_eq!(snap.tools["mystery_tool"].limit, DEFAULT_TOOL_LIMIT);
        assert!(!snap.tools["ffuf_directory_scan"].exhausted);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["tools"]["curl_tool"]["count"], 1);
    }

    #[test]
    fn validate_against_catalog() {
        let catalog = ToolCatalog::new(vec![CatalogTool::new(
            "curl_tool",
            [Capability::Scan],
            "http",
        )])
        .unwrap();
        assert!(
            UsageLimits::new(5)
                .with_tool_limit("curl_tool", 2)
                .validate_against(&catalog)
                .is_ok()
        );
        let err = UsageLimits::new(5)
            .with_tool_limit("culr_tool", 2)
            .validate_against(&catalog)
            .unwrap_err();
        assert!(err.contains("culr_tool"));
    }
}
