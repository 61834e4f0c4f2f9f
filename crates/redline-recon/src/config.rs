//! Assessment configuration with the defaults of the two-phase pipeline.
//!
//! [`ReconConfig`] converts into redline-rs types via
//! [`build_harness_config`](ReconConfig::build_harness_config),
//! [`build_tool_set`](ReconConfig::build_tool_set) and
//! [`phase_limits`](ReconConfig::phase_limits).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use redline_rs::agent::config::HarnessConfig;
use redline_rs::budget::{Capability, DEFAULT_TOOL_LIMIT, Scope, UsageLimits};
use redline_rs::tools::core::{DEFAULT_TOOL_TIMEOUT, ToolSet, ToolTimeouts};

use crate::tools::{CURL_TOOL, FFUF_DIRECTORY_SCAN, ReconToolsExt};

/// One budgeted run of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Attack,
}

impl Phase {
    pub fn capability(self) -> Capability {
        match self {
            Phase::Scan => Capability::Scan,
            Phase::Attack => Capability::Attack,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.capability().fmt(f)
    }
}

/// Built-in budget of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseBudget {
    pub global_limit: u32,
    pub tool_limits: Vec<(String, u32)>,
    /// Cap on reasoning turns.
    pub max_rounds: u32,
}

/// Configuration for one assessment.
#[derive(Debug, Clone)]
pub struct ReconConfig {
    /// Model identifier. Default: `"openai/gpt-4.1"`.
    pub model: String,
    /// Maximum tokens per response. Default: `4096`.
    pub max_tokens: u32,
    /// Default: `0.3`.
    pub temperature: f32,
    /// Retries for transient API errors. Default: `2`.
    pub retries: u32,
    /// Tool calls executing at once. Default: `10`.
    pub max_parallel_tools: usize,
    /// Directory holding `common.txt` and `small.txt`. Default: `"wordlists"`.
    pub wordlist_dir: PathBuf,
    /// Register `nmap_port_scan`. Default: `true`.
    pub nmap: bool,
    /// Default: ffuf 2, curl 5, global 20, 25 rounds.
    pub scan: PhaseBudget,
    /// Default: curl 10, global 20, 25 rounds.
    pub attack: PhaseBudget,
    /// Overrides both phases' global limit when set.
    pub global_call_limit: Option<u32>,
    /// Overrides both phases' round cap when set.
    pub max_rounds: Option<u32>,
    /// Per-tool overrides applied on top of the phase budgets.
    pub tool_limits: Vec<(String, u32)>,
    /// Limit for tools without an explicit entry. Default: `3`.
    pub default_tool_limit: u32,
    pub tool_timeouts: Vec<(String, Duration)>,
    /// Default: 300 s.
    pub default_tool_timeout: Duration,
    /// Which phases run: `scan`, `attack` or `all`. Default: `all`.
    pub scope: Scope,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            model: redline_rs::DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            retries: 2,
            max_parallel_tools: 10,
            wordlist_dir: PathBuf::from("wordlists"),
            nmap: true,
            scan: PhaseBudget {
                global_limit: 20,
                tool_limits: vec![(FFUF_DIRECTORY_SCAN.into(), 2), (CURL_TOOL.into(), 5)],
                max_rounds: 25,
            },
            attack: PhaseBudget {
                global_limit: 20,
                tool_limits: vec![(CURL_TOOL.into(), 10)],
                max_rounds: 25,
            },
            global_call_limit: None,
            max_rounds: None,
            tool_limits: Vec::new(),
            default_tool_limit: DEFAULT_TOOL_LIMIT,
            tool_timeouts: Vec::new(),
            default_tool_timeout: DEFAULT_TOOL_TIMEOUT,
            scope: Scope::All,
        }
    }
}

impl ReconConfig {
    fn budget(&self, phase: Phase) -> &PhaseBudget {
        match phase {
            Phase::Scan => &self.scan,
            Phase::Attack => &self.attack,
        }
    }

    /// Phases to run, in order.
    pub fn phases(&self) -> Vec<Phase> {
        match self.scope {
            Scope::All => vec![Phase::Scan, Phase::Attack],
            Scope::Only(Capability::Scan) => vec![Phase::Scan],
            Scope::Only(Capability::Attack) => vec![Phase::Attack],
        }
    }

    /// Harness settings for `phase`.
    pub fn build_harness_config(&self, phase: Phase) -> HarnessConfig {
        HarnessConfig::new(self.model.clone())
            .with_max_rounds(self.max_rounds.unwrap_or(self.budget(phase).max_rounds))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_retries(self.retries)
            .with_max_parallel_tools(self.max_parallel_tools)
    }

    /// Settings for the summary calls: same model, no tools.
    pub fn build_summary_config(&self) -> HarnessConfig {
        HarnessConfig::new(self.model.clone())
            .with_max_tokens(self.max_tokens.max(8192))
            .with_temperature(self.temperature)
            .with_retries(self.retries)
    }

    /// The phase budget with CLI overrides applied.
    pub fn phase_limits(&self, phase: Phase) -> UsageLimits {
        let budget = self.budget(phase);
        UsageLimits::new(self.global_call_limit.unwrap_or(budget.global_limit))
            .with_default_limit(self.default_tool_limit)
            .with_tool_limits(budget.tool_limits.iter().cloned())
            .with_tool_limits(self.tool_limits.iter().cloned())
    }

    pub fn build_tool_timeouts(&self) -> ToolTimeouts {
        self.tool_timeouts.iter().fold(
            ToolTimeouts::new(self.default_tool_timeout),
            |timeouts, (tool, limit)| timeouts.with_tool_timeout(tool.clone(), *limit),
        )
    }

    /// ffuf, curl and (unless disabled) nmap, under the configured timeouts.
    pub fn build_tool_set(&self) -> ToolSet {
        ToolSet::new()
            .with_timeouts(self.build_tool_timeouts())
            .with_recon_tools(self.wordlist_dir.clone(), self.nmap)
    }
}

/// Parse `name=N`, as used by `--tool-limit` and `--tool-timeout`.
pub fn parse_assignment(s: &str) -> Result<(String, u64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing tool name in '{s}'"));
    }
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value in '{s}': {e}"))?;
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::NMAP_PORT_SCAN;

    #[test]
    fn defaults_match_pipeline_budgets() {
        let config = ReconConfig::default();
        let scan = config.phase_limits(Phase::Scan);
        assert_eq!(scan.global_limit(), 20);
        assert_eq!(scan.limit_for(FFUF_DIRECTORY_SCAN), 2);
        assert_eq!(scan.limit_for(CURL_TOOL), 5);
        assert_eq!(scan.limit_for(NMAP_PORT_SCAN), DEFAULT_TOOL_LIMIT);

        let attack = config.phase_limits(Phase::Attack);
        assert_eq!(attack.limit_for(CURL_TOOL), 10);
        assert_eq!(config.build_harness_config(Phase::Attack).max_rounds, 25);
        assert_eq!(config.phases(), vec![Phase::Scan, Phase::Attack]);
    }

    #[test]
    fn overrides_apply_to_every_phase() {
        let config = ReconConfig {
            global_call_limit: Some(4),
            max_rounds: Some(6),
            tool_limits: vec![(CURL_TOOL.into(), 1)],
            default_tool_limit: 0,
            scope: Scope::Only(Capability::Attack),
            ..Default::default()
        };
        for phase in [Phase::Scan, Phase::Attack] {
            let limits = config.phase_limits(phase);
            assert_eq!(limits.global_limit(), 4);
            assert_eq!(limits.limit_for(CURL_TOOL), 1);
            assert_eq!(limits.default_limit(), 0);
            assert_eq!(config.build_harness_config(phase).max_rounds, 6);
        }
        assert_eq!(config.phases(), vec![Phase::Attack]);
    }

    #[test]
    fn tool_set_honors_timeouts_and_nmap_flag() {
        let config = ReconConfig {
            nmap: false,
            tool_timeouts: vec![(CURL_TOOL.into(), Duration::from_secs(30))],
            default_tool_timeout: Duration::from_secs(120),
            ..Default::default()
        };
        let tools = config.build_tool_set();
        assert!(!tools.contains(NMAP_PORT_SCAN));
        assert_eq!(tools.timeouts().timeout_for(CURL_TOOL), Duration::from_secs(30));
        assert_eq!(
            tools.timeouts().timeout_for(FFUF_DIRECTORY_SCAN),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_assignment("curl_tool=7").unwrap(),
            ("curl_tool".to_string(), 7)
        );
        assert!(parse_assignment("curl_tool").is_err());
        assert!(parse_assignment("=3").is_err());
        assert!(parse_assignment("curl_tool=-1").is_err());
    }
}
