//! Retry policy for external tool invocations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use audiopipe_core::config::RetryConfig;
use audiopipe_transcoder::ToolError;

/// Decides whether a failed tool run is attempted again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff_multiplier: f64,
    retry_tool_failures: bool,
}

impl RetryPolicy {
    /// A policy that runs every operation exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            retry_tool_failures: false,
        }
    }

    /// Maximum number of attempts, at least one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `error` on attempt number `attempt` (1-based) warrants another try.
    pub fn should_retry(&self, error: &ToolError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match error {
            ToolError::ProcessFailed { .. } => self.retry_tool_failures,
            other => other.is_transient(),
        }
    }

    /// Delay before the attempt following attempt number `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.delay.mul_f64(self.backoff_multiplier.max(1.0).powi(exponent))
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// Returns the last result together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> (Result<T, ToolError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if self.should_retry(&e, attempt) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Tool attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.delay_seconds),
            backoff_multiplier: config.backoff_multiplier,
            retry_tool_failures: config.retry_tool_failures,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
