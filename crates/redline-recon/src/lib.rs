//! Web-application assessment agent built on redline-rs.
//!
//! A reconnaissance phase (directory fuzzing, port scanning, HTTP probing)
//! feeds an exploitation phase (HTTP probing only). Each phase runs under
//! its own tool-call budget and ends in a structured summary; both
//! summaries are combined into a final [`AssessmentReport`].
//!
//! ```ignore
//! use redline_recon::{Assessment, ReconConfig, Target, recon_catalog};
//!
//! let config = ReconConfig::default();
//! let catalog = recon_catalog(config.nmap)?;
//! let tools = config.build_tool_set();
//! let target = Target::web("http://localhost:8000", "Demo API")?;
//!
//! let outcome = Assessment::new(&client, &config, &tools, &catalog)
//!     .run(&target)
//!     .await?;
//! println!("{}", outcome.to_markdown());
//! ```

pub mod config;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod target;
pub mod tools;

pub use config::{Phase, PhaseBudget, ReconConfig};
pub use pipeline::Assessment;
pub use report::{AssessmentOutcome, AssessmentReport, AttackReportSummary, ScanSummary};
pub use target::{Target, TargetKind};
pub use tools::{ReconClassifier, ReconToolsExt, recon_catalog};
