//! Run correlation ids and cost estimation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique trace id for one harness run.
pub fn generate_trace_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tr-{ts:x}-{count:04x}")
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (f64::from(prompt_tokens) / 1_000_000.0) * self.input_per_million
            + (f64::from(completion_tokens) / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::new(3.0, 15.0)
    }
}

/// Substring patterns checked in order; first match wins.
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("opus", ModelPricing::new(15.0, 75.0)),
    ("sonnet", ModelPricing::new(3.0, 15.0)),
    ("haiku", ModelPricing::new(0.25, 1.25)),
    ("4o-mini", ModelPricing::new(0.15, 0.60)),
    ("gpt-4o", ModelPricing::new(2.50, 10.0)),
    ("gpt-4", ModelPricing::new(2.50, 10.0)),
    ("gemini-flash", ModelPricing::new(0.075, 0.30)),
    ("gemini", ModelPricing::new(1.25, 5.0)),
    ("deepseek", ModelPricing::new(0.27, 1.10)),
];

/// Approximate pricing for a model id such as `"openai/gpt-4o"`.
///
/// Only the segment after the last `/` is matched. Unknown models fall back
/// to [`ModelPricing::default`].
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();
    let normalized = if name.contains("gemini") && name.contains("flash") {
        "gemini-flash".to_string()
    } else {
        name
    };
    PRICING_TABLE
        .iter()
        .find(|(pattern, _)| normalized.contains(*pattern))
        .map(|(_, pricing)| *pricing)
        .unwrap_or_default()
}

/// Cumulative token and cost totals for a run.
#[derive(Debug, Default, Clone)]
pub struct CostTracker {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32, pricing: &ModelPricing) {
        self.total_prompt_tokens += u64::from(prompt_tokens);
        self.total_completion_tokens += u64::from(completion_tokens);
        self.estimated_cost_usd += pricing.estimate_cost(prompt_tokens, completion_tokens);
    }

    /// Fold another tracker (e.g. a summary call) into this one.
    pub fn absorb(&mut self, other: &CostTracker) {
        self.total_prompt_tokens += other.total_prompt_tokens;
        self.total_completion_tokens += other.total_completion_tokens;
        self.estimated_cost_usd += other.estimated_cost_usd;
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    pub fn summary(&self) -> String {
        format!(
            "tokens: {} prompt + {} completion = {} total, est. cost: ${:.4}",
            self.total_prompt_tokens,
            self.total_completion_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}
