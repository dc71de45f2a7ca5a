//! Retry policy for image generation jobs
//!
//! A failed attempt is retried after a fixed delay while the error is
//! retryable and the attempt budget is not spent. What counts as retryable is
//! decided here, not by the job, so the dispatcher and the job agree on it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::job::JobError;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the job again as `next_attempt` after `delay`
    Retry { next_attempt: u32, delay: Duration },
    /// Retryable error, but the attempt budget is spent
    Exhausted,
    /// Error is not retryable under this policy
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
    /// Also retry download, upload and persist failures
    ///
    /// Off by default: only provider failures are retried.
    pub retry_downstream_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(10),
            retry_downstream_failures: false,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            ..Self::default()
        }
    }

    pub fn with_downstream_retries(mut self, enabled: bool) -> Self {
        self.retry_downstream_failures = enabled;
        self
    }

    pub fn is_retryable(&self, error: &JobError) -> bool {
        error.is_retryable() || (self.retry_downstream_failures && error.is_downstream())
    }

    /// Decide the follow-up for `error` raised during `attempt` (1-based)
    pub fn decide(&self, error: &JobError, attempt: u32) -> RetryDecision {
        if !self.is_retryable(error) {
            RetryDecision::Fatal
        } else if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry {
                next_attempt: attempt + 1,
                delay: self.delay,
            }
        }
    }
}
