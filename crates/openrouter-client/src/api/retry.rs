//! Automatic retry with exponential backoff.
//!
//! [`execute`] wraps a single attempt (one HTTP round trip) in a loop that
//! retries transient failures (408, 429, 5xx, transport errors) as
//! classified by [`Error::is_retryable`]. Validation failures, other 4xx
//! responses, decode failures and cancellation are returned immediately.
//!
//! Backoff sleeps are per call and raced against the caller's
//! [`CancellationToken`], so a cancelled request returns without waiting out
//! the remaining delay.

use crate::api::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Ceiling applied to every computed delay.
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 doubles the delay each attempt).
    pub multiplier: f64,
    /// Scale delays by a deterministic factor to spread out concurrent
    /// retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// A policy with the given attempt count and default delays.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::with_attempts(1)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Reject policies that cannot make a single attempt.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::validation(
                "retry.multiplier",
                format!("must be a finite value >= 1.0, got {}", self.multiplier),
            ));
        }
        Ok(())
    }

    /// Delay to wait before `attempt` (1-indexed). The first attempt runs
    /// immediately; attempt `n > 1` waits `base_delay * multiplier^(n-2)`,
    /// capped at `max_delay`.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // 0 * inf is NaN, and f64::min would turn that into the cap.
        if base.is_nan() {
            return Duration::ZERO;
        }
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic per-attempt factors; avoids a rand dependency.
        let jitter_factor = match (self.jitter, attempt % 4) {
            (false, _) => 1.0,
            (true, 0) => 0.75,
            (true, 1) => 0.90,
            (true, 2) => 0.60,
            (true, _) => 0.85,
        };
        // Near Duration::MAX the f64 round trip can overflow.
        Duration::try_from_secs_f64(capped * jitter_factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay before `attempt`, stretched to honor a server-supplied
    /// `Retry-After` and still capped at `max_delay`.
    fn wait_for(&self, attempt: u32, err: &Error) -> Duration {
        let backoff = self.delay_before_attempt(attempt);
        let requested = err
            .as_api()
            .and_then(|api| api.retry_after)
            .unwrap_or(Duration::ZERO);
        backoff.max(requested).min(self.max_delay)
    }
}

/// A failed attempt, as reported to the `on_failure` callback of [`execute`].
#[derive(Debug)]
pub struct AttemptFailure<'a> {
    /// 1-indexed attempt that failed.
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a Error,
    /// Wait before the next attempt, or `None` if this error is final.
    pub retry_in: Option<Duration>,
}

/// Run `attempt` under `policy`.
///
/// `attempt` receives the 1-indexed attempt number. On exhaustion the error
/// from the final attempt is returned; earlier errors are only passed to
/// `on_failure`. Cancellation is checked before each attempt and during each
/// backoff wait.
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
    mut on_failure: impl FnMut(&AttemptFailure<'_>),
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let err = match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || n >= max_attempts {
            if n > 1 {
                debug!("Giving up after {n} attempt(s)");
            }
            on_failure(&AttemptFailure {
                attempt: n,
                max_attempts,
                error: &err,
                retry_in: None,
            });
            return Err(err);
        }

        let delay = policy.wait_for(n + 1, &err);
        debug!("Attempt {n}/{max_attempts} failed; next in {delay:?}");
        on_failure(&AttemptFailure {
            attempt: n,
            max_attempts,
            error: &err,
            retry_in: Some(delay),
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        n += 1;
    }
}
