//! Retry logic with exponential backoff
//!
//! The wait after failed attempt `n` (0-based) is
//! `backoff_base * 2^n + uniform(0, max_jitter)`. No wait follows the final
//! attempt.
//!
//! # Example
//!
//! ```no_run
//! use likes_dl::retry::{IsRetryable, RetryPolicy, with_retry};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let policy = RetryPolicy::new(3, Duration::from_millis(500));
//! with_retry(&policy, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Default upper bound of the random jitter added to each backoff
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(100);

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection reset, server overloaded) return `true`.
/// Permanent failures (bad request, authentication, malformed payload) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
            // Server-side trouble and rate limiting
            Error::Http { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            // Truncated transfer; a fresh attempt may deliver the body
            Error::EmptyFile { .. } => true,
            Error::Filesystem { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Decode { .. }
            | Error::Application { .. }
            | Error::InvalidRecord(_)
            | Error::Validation(_)
            | Error::Config { .. }
            | Error::Serialization(_) => false,
        }
    }
}

/// Which failures a [`RetryPolicy`] retries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryScope {
    /// Only errors whose [`IsRetryable::is_retryable`] is true
    Transient,
    /// Every failure, until attempts run out
    All,
}

/// How many times to try and how long to wait in between
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 0 behaves like 1
    pub attempts: u32,
    /// Base of the exponential backoff
    pub backoff_base: Duration,
    /// Upper bound of the uniform jitter added to each wait
    pub max_jitter: Duration,
    /// Failures eligible for another attempt
    pub scope: RetryScope,
}

impl RetryPolicy {
    /// Policy retrying transient failures with the default jitter
    pub fn new(attempts: u32, backoff_base: Duration) -> Self {
        Self {
            attempts,
            backoff_base,
            max_jitter: DEFAULT_MAX_JITTER,
            scope: RetryScope::Transient,
        }
    }

    /// Single attempt, no waiting
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Replace the jitter bound
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Replace the retry scope
    pub fn with_scope(mut self, scope: RetryScope) -> Self {
        self.scope = scope;
        self
    }

    fn should_retry<E: IsRetryable>(&self, error: &E) -> bool {
        match self.scope {
            RetryScope::All => true,
            RetryScope::Transient => error.is_retryable(),
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the first success, or the error of the last attempt once attempts
/// are exhausted or a failure falls outside the policy's scope.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt + 1 < attempts && policy.should_retry(&e) => {
                let delay = backoff_delay(policy.backoff_base, attempt, policy.max_jitter);

                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if policy.should_retry(&e) {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::warn!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Wait before the attempt following failed attempt `attempt` (0-based)
///
/// `base * 2^attempt` plus a uniform jitter in `[0, max_jitter)`. The
/// exponential part saturates instead of overflowing.
pub fn backoff_delay(base: Duration, attempt: u32, max_jitter: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
        .saturating_add(jitter(max_jitter))
}

fn jitter(max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    let ms: f64 = rng.gen_range(0.0..max_jitter.as_secs_f64() * 1000.0);
    Duration::from_secs_f64(ms / 1000.0)
}
