//! Call controls for external collaborators: per-attempt timeout and bounded
//! retry with exponential backoff.
//!
//! Only transient failures are retried. A permanent collaborator error or a
//! malformed assessment is returned on the first occurrence.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{AssessmentError, CollaboratorError, RepositoryError};

/// Timeout and retry budget for one class of external call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallPolicy {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Maximum number of retries (0 = no retries, run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

impl CallPolicy {
    pub fn new(timeout_ms: u64, max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            timeout_ms,
            max_retries,
            backoff_base_ms,
        }
    }

    /// Same timeout, single attempt.
    pub fn without_retries(&self) -> Self {
        Self {
            max_retries: 0,
            ..self.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Classifies errors for the retry loop.
pub trait RetryClass: Sized {
    /// Whether another attempt may succeed.
    fn is_transient(&self) -> bool;

    /// Error to report when an attempt exceeds its timeout.
    fn timed_out(operation: &str, limit_ms: u64) -> Self;
}

impl RetryClass for CollaboratorError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    fn timed_out(operation: &str, limit_ms: u64) -> Self {
        Self::Timeout {
            collaborator: operation.to_string(),
            limit_ms,
        }
    }
}

impl RetryClass for RepositoryError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    fn timed_out(operation: &str, limit_ms: u64) -> Self {
        Self::NetworkError(format!("{operation} timed out after {limit_ms}ms"))
    }
}

impl RetryClass for AssessmentError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::BackendUnavailable(_))
    }

    fn timed_out(_operation: &str, limit_ms: u64) -> Self {
        Self::Timeout { limit_ms }
    }
}

/// Run `call` under `policy`.
///
/// Each attempt is bounded by `policy.timeout_ms`. Transient failures are
/// retried up to `policy.max_retries` times with exponential backoff; the last
/// error is returned once the budget is spent.
pub async fn call_with_policy<T, E, F, Fut>(
    policy: &CallPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClass + Display,
{
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        let err = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_elapsed) => E::timed_out(operation, policy.timeout_ms),
        };

        if !err.is_transient() {
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!(
                operation = %operation,
                attempts = attempt,
                error = %err,
                "retry budget exhausted"
            );
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        warn!(
            operation = %operation,
            attempt = attempt,
            max_attempts = max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
