//! Budgeted web-application assessment from the command line.
//!
//! Runs the reconnaissance and attack phases against one target and prints
//! the markdown report. Reads the API key from the `OPENROUTER_KEY`
//! environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Full assessment of a local demo API
//! redline --target-url http://localhost:8000 --target-description "FastAPI demo"
//!
//! # Reconnaissance only, tighter budget, report to a file
//! redline --target-url http://localhost:8000 --scope scan \
//!     --global-call-limit 8 --tool-limit ffuf_directory_scan=1 --output recon.md
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use redline_recon::{Assessment, ReconConfig, Target, recon_catalog};
use redline_recon::config::parse_assignment;
use redline_rs::budget::Scope;
use redline_rs::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Budgeted LLM-driven web-application assessment.
#[derive(Parser)]
#[command(name = "redline")]
struct Cli {
    /// Base URL of the target, e.g. http://localhost:8000.
    #[arg(long)]
    target_url: String,

    /// What the target is. Shown to the model.
    #[arg(long, default_value = "Web application")]
    target_description: String,

    /// Phases to run: scan, attack or all.
    #[arg(long, default_value = "all")]
    scope: Scope,

    /// Model to use for reasoning and summaries.
    #[arg(long, default_value = redline_rs::DEFAULT_MODEL)]
    model: String,

    /// Cap on reasoning turns per phase (default: 25).
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Maximum tokens per model response.
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.3)]
    temperature: f32,

    /// Retries for transient API errors.
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Tool calls executing at once.
    #[arg(long, default_value_t = 10)]
    max_parallel_tools: usize,

    /// Total tool calls per phase (default: 20).
    #[arg(long)]
    global_call_limit: Option<u32>,

    /// Per-tool call limit as NAME=N. Repeatable.
    #[arg(long = "tool-limit", value_parser = parse_assignment)]
    tool_limits: Vec<(String, u64)>,

    /// Limit for tools without an explicit entry.
    #[arg(long, default_value_t = redline_rs::budget::DEFAULT_TOOL_LIMIT)]
    default_tool_limit: u32,

    /// Per-tool timeout as NAME=SECONDS. Repeatable.
    #[arg(long = "tool-timeout", value_parser = parse_assignment)]
    tool_timeouts: Vec<(String, u64)>,

    /// Timeout in seconds for tools without an explicit entry.
    #[arg(long, default_value_t = 300)]
    default_tool_timeout: u64,

    /// Directory holding the ffuf wordlists (common.txt, small.txt).
    #[arg(long, default_value = "wordlists")]
    wordlist_dir: PathBuf,

    /// Do not offer nmap_port_scan.
    #[arg(long)]
    no_nmap: bool,

    /// Write the markdown report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<(ReconConfig, Target, Option<PathBuf>), String> {
        let target = Target::web(&self.target_url, &self.target_description)?;
        let tool_limits = self
            .tool_limits
            .into_iter()
            .map(|(name, limit)| {
                u32::try_from(limit)
                    .map(|limit| (name.clone(), limit))
                    .map_err(|_| format!("tool limit for '{name}' is too large"))
            })
            .collect::<Result<Vec<_>, String>>()?;

        let config = ReconConfig {
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            retries: self.retries,
            max_parallel_tools: self.max_parallel_tools,
            wordlist_dir: self.wordlist_dir,
            nmap: !self.no_nmap,
            global_call_limit: self.global_call_limit,
            max_rounds: self.max_rounds,
            tool_limits,
            default_tool_limit: self.default_tool_limit,
            tool_timeouts: self
                .tool_timeouts
                .into_iter()
                .map(|(name, secs)| (name, Duration::from_secs(secs)))
                .collect(),
            default_tool_timeout: Duration::from_secs(self.default_tool_timeout),
            scope: self.scope,
            ..Default::default()
        };
        Ok((config, target, self.output))
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (config, target, output) = match cli.into_config() {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: OPENROUTER_KEY environment variable is not set");
            std::process::exit(1);
        }
    };

    let client = match OpenRouterClient::with_headers(
        api_key,
        "https://github.com/redline-sec/redline",
        "redline",
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            std::process::exit(1);
        }
    };

    let catalog = match recon_catalog(config.nmap) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let tools = config.build_tool_set();

    // First Ctrl-C cancels the run; partial results are still reported.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    info!(url = %target.url, scope = %config.scope, "Starting assessment");
    let result = Assessment::new(&client, &config, &tools, &catalog)
        .with_event_handler(&LoggingHandler)
        .with_cancellation(cancel)
        .run(&target)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    info!(
        cost_usd = %format!("{:.4}", outcome.estimated_cost_usd()),
        cancelled = outcome.cancelled,
        "Assessment finished"
    );

    let markdown = outcome.to_markdown();
    match output {
        Some(path) => {
            if let Err(e) = tokio::fs::write(&path, markdown).await {
                eprintln!("Error: failed to write {}: {e}", path.display());
                std::process::exit(1);
            }
            info!(path = %path.display(), "Report written");
        }
        None => println!("{markdown}"),
    }
}
