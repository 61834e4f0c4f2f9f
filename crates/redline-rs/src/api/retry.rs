//! Retry with exponential backoff for LLM API calls.
//!
//! Transient failures (429, 5xx, dropped connections) are retried. Client
//! errors (400, 401, 403, 404, 422) fail immediately. A reasoning-step error
//! that survives its retries is fatal to the run.

use std::time::Duration;
use tracing::warn;

/// Backoff settings for a retried call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries. `0` means one attempt only.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = base.min(self.max_delay.as_secs_f64());

        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        // Fixed jitter schedule; no rand dependency.
        const FACTORS: [f64; 4] = [0.75, 0.90, 0.60, 0.85];
        let factor = FACTORS[attempt as usize % FACTORS.len()];
        Duration::from_secs_f64(capped * factor)
    }
}

/// How an error string should be treated by [`retry_api_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
    Unknown,
}

const PERMANENT_MARKERS: &[&str] = &[
    "HTTP 400",
    "HTTP 401",
    "HTTP 403",
    "HTTP 404",
    "HTTP 422",
    "bad request",
    "unauthorized",
];

const TRANSIENT_STATUSES: &[&str] = &["429", "500", "502", "503", "504"];

const TRANSIENT_MARKERS: &[&str] = &[
    "request failed:",
    "connection reset",
    "connection refused",
    "timed out",
    "timeout",
    "broken pipe",
    "network",
];

/// Classify an error string. Permanent markers win over transient ones.
pub fn classify_error(error: &str) -> ErrorClass {
    if PERMANENT_MARKERS.iter().any(|p| error.contains(p)) {
        return ErrorClass::Permanent;
    }
    if TRANSIENT_STATUSES
        .iter()
        .any(|s| error.contains(&format!("HTTP {s}")))
    {
        return ErrorClass::Transient;
    }
    let lower = error.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|p| lower.contains(p)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Unknown
    }
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
pub async fn retry_api_call<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= config.max_retries || classify_error(&e) != ErrorClass::Transient {
                    return Err(e);
                }
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient API error (attempt {}/{}): {e}. Retrying in {delay:?}",
                    attempt + 1,
                    config.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
