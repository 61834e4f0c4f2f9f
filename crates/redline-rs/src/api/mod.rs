//! API helpers shared by the reasoning and summary collaborators.
//!
//! - [`retry`]: error classification and exponential backoff. Tool
//!   execution never retries; only LLM calls go through [`retry::retry_api_call`].
//! - [`tracing`]: per-run trace ids, model pricing, and [`CostTracker`].

pub mod retry;
pub mod tracing;

pub use retry::{ErrorClass, RetryConfig, classify_error, retry_api_call};
pub use tracing::{CostTracker, ModelPricing, generate_trace_id, pricing_for_model};
