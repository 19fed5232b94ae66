//! Retry utilities with exponential backoff
//!
//! Generation backends fail transiently (rate limits, 5xx, dropped connections).
//! [`retry_transient`] retries those and gives up immediately on anything that
//! will not improve with another attempt (bad credentials, malformed requests).
//!
//! # Examples
//!
//! ```rust,no_run
//! use log_insight::retry::{retry_transient, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_millis(200));
//!
//! let text = retry_transient(&config, "gemini", || async {
//!     Ok::<_, log_insight::Error>(Some("analysis".to_string()))
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Random jitter as a fraction of the delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after the given (zero-based) failed attempt
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let grown = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = grown.min(self.max_delay.as_millis() as f64);

        let spread = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * spread - spread / 2.0;

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Whether another attempt could plausibly succeed.
///
/// Network failures, timeouts, stream interruptions and 429/5xx API responses are
/// transient. Configuration, input and decoding problems are not.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(e) => !e.is_builder() && !e.is_decode(),
        Error::Timeout => true,
        Error::Stream(_) => true,
        Error::Api(msg) => matches!(api_status(msg), Some(429 | 500 | 502 | 503 | 504)),
        _ => false,
    }
}

/// HTTP status leading an API error message (`"API error 503 Service Unavailable: ..."`).
///
/// Only the status token is read; the response body never decides retryability.
fn api_status(msg: &str) -> Option<u16> {
    msg.strip_prefix("API error ")
        .unwrap_or(msg)
        .split_whitespace()
        .next()?
        .trim_end_matches(':')
        .parse()
        .ok()
}

/// Retry `operation` while `should_retry` approves the error.
///
/// Returns the first success, the first non-retryable error, or the last error once
/// attempts run out.
pub async fn retry_if<F, Fut, T, P>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let attempts = config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !should_retry(&err) {
                    return Err(err);
                }

                if attempt + 1 < attempts {
                    let delay = config.delay_for(attempt);
                    log::warn!(
                        "{}: attempt {}/{} failed ({}); retrying in {:?}",
                        label,
                        attempt + 1,
                        attempts,
                        err,
                        delay
                    );
                    sleep(delay).await;
                }

                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other(format!("{}: retry loop made no attempts", label))))
}

/// Retry only transient failures (see [`is_retryable_error`])
pub async fn retry_transient<F, Fut, T>(config: &RetryConfig, label: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_if(config, label, operation, is_retryable_error).await
}
