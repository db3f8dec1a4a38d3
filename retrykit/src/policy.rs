//! Retry policy: the immutable, shareable description of how to retry.

use crate::backoff::{Backoff, BackoffExt, Exponential};
use crate::clock::{Clock, SystemClock};
use crate::error::{AttemptResult, RetryError};
use crate::executor::Retry;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempts made when none (or zero) is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Base delay of the default exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
/// Cap applied by [`RetryPolicy::default`].
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
/// Jitter factor applied by [`RetryPolicy::default`].
pub const DEFAULT_JITTER: f64 = 0.2;

/// Retry policy. Immutable once built, cheap to clone, safe to share between
/// concurrent callers: each call gets its own state.
///
/// # Example
///
/// ```rust
/// use retrykit::{AttemptError, BackoffExt, Exponential, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::builder()
///     .max_attempts(5)
///     .max_duration(Duration::from_secs(30))
///     .backoff(Exponential::new(Duration::from_millis(1)).with_cap(Duration::from_millis(5)))
///     .build();
///
/// let mut calls = 0;
/// let value = policy
///     .run(|| {
///         calls += 1;
///         let n = calls;
///         async move {
///             if n < 3 {
///                 Err(AttemptError::from("not yet"))
///             } else {
///                 Ok(n)
///             }
///         }
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(value, 3);
/// # });
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_duration: Duration,
    backoff: Arc<dyn Backoff>,
    clock: Arc<dyn Clock>,
}

impl Default for RetryPolicy {
    /// 3 attempts, exponential from 100ms capped at 10s, ±20% jitter.
    fn default() -> Self {
        Self::builder()
            .max_attempts(DEFAULT_MAX_ATTEMPTS)
            .backoff(
                Exponential::new(DEFAULT_BASE_DELAY)
                    .with_cap(DEFAULT_MAX_DELAY)
                    .with_jitter(DEFAULT_JITTER),
            )
            .build()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("max_duration", &self.max_duration)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// A policy that makes exactly one attempt.
    pub fn never() -> Self {
        Self::builder().max_attempts(1).build()
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Total time budget; zero means unbounded.
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// The delay strategy.
    pub fn backoff(&self) -> &Arc<dyn Backoff> {
        &self.backoff
    }

    /// The time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start a call with per-call hooks and overrides.
    pub fn retry<'a, E>(&self) -> Retry<'a, E> {
        Retry::new(self)
    }

    /// Run `operation` under this policy.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AttemptResult<T, E>>,
        E: fmt::Debug,
    {
        self.retry().run(operation).await
    }

    /// Run `operation` under this policy, stopping early when `cancel` fires
    /// during a backoff sleep.
    pub async fn run_with_cancel<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = AttemptResult<T, E>>,
        E: fmt::Debug,
    {
        self.retry().run_with_cancel(cancel, operation).await
    }
}

/// Builder for [`RetryPolicy`].
///
/// Unset fields default to 3 attempts, no time budget, exponential backoff
/// from 100ms and the system clock.
#[derive(Default)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    max_duration: Option<Duration>,
    backoff: Option<Arc<dyn Backoff>>,
    clock: Option<Arc<dyn Clock>>,
}

impl fmt::Debug for RetryPolicyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicyBuilder")
            .field("max_attempts", &self.max_attempts)
            .field("max_duration", &self.max_duration)
            .field("has_backoff", &self.backoff.is_some())
            .field("has_clock", &self.clock.is_some())
            .finish()
    }
}

impl RetryPolicyBuilder {
    /// Set the maximum number of attempts. Zero falls back to the default.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Set the total time budget. Zero means unbounded.
    #[must_use]
    pub fn max_duration(mut self, d: Duration) -> Self {
        self.max_duration = Some(d);
        self
    }

    /// Set the backoff strategy.
    #[must_use]
    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Set an already shared backoff strategy.
    #[must_use]
    pub fn shared_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Set the clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Build the policy.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            max_duration: self.max_duration.unwrap_or(Duration::ZERO),
            backoff: self
                .backoff
                .unwrap_or_else(|| Arc::new(Exponential::new(DEFAULT_BASE_DELAY))),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
        }
    }
}
