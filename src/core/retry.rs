//! Retry policy for transient upstream failures.
//!
//! Only server errors (status >= 500) are retried. Client errors, decode
//! failures and network failures surface on the first attempt. The wait before
//! retry `n` (1-based) is `n * step`, so with the default 200ms step a budget of
//! 2 waits 200ms then 400ms.

use std::time::Duration;

use reqwest::StatusCode;

/// Default delay unit between attempts.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(200);

/// Linear backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay multiplied by the attempt number.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom step.
    pub const fn with_step(step: Duration) -> Self {
        Self { step }
    }

    /// Delay before retry number `attempt` (1 for the first retry).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }

    /// Whether a response with `status` may be retried. Codes above 599 are
    /// non-standard but still count as server failures.
    pub fn should_retry(status: StatusCode) -> bool {
        status.as_u16() >= 500
    }
}
