//! Configuration for the [`Harness`](super::harness::Harness).
//!
//! ```ignore
//! let config = HarnessConfig::new("openai/gpt-4.1")
//!     .with_max_rounds(25)
//!     .with_temperature(0.3)
//!     .with_max_parallel_tools(4)
//!     .with_retries(3);
//! ```

use crate::api::retry::RetryConfig;

/// Settings for one harness run. Budgets live in
/// [`BudgetRun`](crate::budget::BudgetRun), not here.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Model identifier (e.g. `"openai/gpt-4.1"`).
    pub model: String,
    /// Cap on reasoning turns. Guarantees termination even when every
    /// tool budget is generous and the model never calls a tool.
    pub max_rounds: u32,
    /// Maximum tokens per model response. `0` leaves it to the provider.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retry policy for reasoning and summary calls.
    pub retry: RetryConfig,
    /// Upper bound on tool calls executing at once within a turn.
    pub max_parallel_tools: usize,
    /// Whether the model may request several tool calls per turn.
    pub parallel_tool_calls: bool,
}

impl HarnessConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Retry transient API failures (429, 5xx, network errors) with
    /// exponential backoff. `0` disables retries.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(max_retries);
        self
    }

    /// Values below 1 are treated as 1.
    pub fn with_max_parallel_tools(mut self, max: usize) -> Self {
        self.max_parallel_tools = max.max(1);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            max_rounds: 25,
            max_tokens: 4096,
            temperature: 0.3,
            retry: RetryConfig::default(),
            max_parallel_tools: 10,
            parallel_tool_calls: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = HarnessConfig::new("openai/gpt-4o")
            .with_max_rounds(5)
            .with_max_tokens(512)
            .with_temperature(0.0)
            .with_retries(0)
            .with_max_parallel_tools(0)
            .with_parallel_tool_calls(false);
        assert_eq!(config.model, "openai/gpt-4o");
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.max_parallel_tools, 1);
        assert!(!config.parallel_tool_calls);
    }

    #[test]
    fn defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.model, crate::DEFAULT_MODEL);
        assert_eq!(config.max_rounds, 25);
        assert!((config.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.max_parallel_tools, 10);
    }
}
