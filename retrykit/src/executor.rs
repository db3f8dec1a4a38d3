//! Retry executor for running operations with retries.

use crate::backoff::Backoff;
use crate::clock::Clock;
use crate::config::CallConfig;
use crate::error::{AttemptError, AttemptResult, RetryError, StopReason};
use crate::policy::RetryPolicy;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A single call under a [`RetryPolicy`], with per-call hooks and overrides.
///
/// The policy itself is never modified.
///
/// # Example
///
/// ```rust
/// use retrykit::{AttemptError, Constant, RetryPolicy, StopReason};
/// use std::time::Duration;
///
/// #[derive(Debug, PartialEq)]
/// enum ApiError {
///     Unavailable,
///     NotFound,
/// }
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::builder()
///     .max_attempts(5)
///     .backoff(Constant::new(Duration::from_millis(1)))
///     .build();
///
/// let mut retries = Vec::new();
/// let mut calls = 0;
/// let err = policy
///     .retry()
///     .retry_if(|e: &ApiError| *e == ApiError::Unavailable)
///     .on_retry(|attempt, _, _| retries.push(attempt))
///     .run(|| {
///         calls += 1;
///         let n = calls;
///         async move {
///             if n < 3 {
///                 Err::<(), _>(AttemptError::from(ApiError::Unavailable))
///             } else {
///                 Err(AttemptError::from(ApiError::NotFound))
///             }
///         }
///     })
///     .await
///     .unwrap_err();
///
/// assert_eq!(err.reason(), StopReason::Rejected);
/// assert_eq!(*err.last(), ApiError::NotFound);
/// assert_eq!(retries, vec![1, 2]);
/// # });
/// ```
pub struct Retry<'a, E> {
    config: CallConfig<'a, E>,
}

impl<E> fmt::Debug for Retry<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry").field("config", &self.config).finish()
    }
}

impl<'a, E> Retry<'a, E> {
    /// Start a call seeded from `policy`.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            config: CallConfig::from_policy(policy),
        }
    }

    /// Override the attempt cap for this call.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    /// Override the time budget for this call. Zero means unbounded.
    #[must_use]
    pub fn max_duration(mut self, d: Duration) -> Self {
        self.config.max_duration = d;
        self
    }

    /// Override the backoff strategy for this call.
    #[must_use]
    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.config.backoff = Arc::new(backoff);
        self
    }

    /// Override the clock for this call.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.config.clock = Arc::new(clock);
        self
    }

    /// Only retry errors for which `predicate` returns `true`.
    ///
    /// A rejected error ends the call with [`StopReason::Rejected`]; the
    /// exhaustion hook is not invoked.
    #[must_use]
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'a,
    {
        self.config.condition = Some(Box::new(predicate));
        self
    }

    /// Retry every error except those for which `predicate` returns `true`.
    #[must_use]
    pub fn retry_unless<P>(self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'a,
    {
        self.retry_if(move |error| !predicate(error))
    }

    /// Called before each backoff sleep with `(attempt, error, delay)`.
    ///
    /// Hooks run inline with the retry loop and must not block.
    #[must_use]
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: FnMut(u32, &E, Duration) + Send + 'a,
    {
        self.config.on_retry = Some(Box::new(hook));
        self
    }

    /// Called with the attempt number that succeeded.
    #[must_use]
    pub fn on_success<H>(mut self, hook: H) -> Self
    where
        H: FnMut(u32) + Send + 'a,
    {
        self.config.on_success = Some(Box::new(hook));
        self
    }

    /// Called once when the attempt or time budget runs out, with the final
    /// attempt number and error. Not called on cancellation, rejection or
    /// terminal errors.
    #[must_use]
    pub fn on_exhausted<H>(mut self, hook: H) -> Self
    where
        H: FnMut(u32, &E) + Send + 'a,
    {
        self.config.on_exhausted = Some(Box::new(hook));
        self
    }

    /// Return every failure instead of only the most recent one.
    #[must_use]
    pub fn collect_errors(mut self) -> Self {
        self.config.collect_errors = true;
        self
    }

    /// Run the operation with retries.
    pub async fn run<F, Fut, T>(self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AttemptResult<T, E>>,
        E: fmt::Debug,
    {
        let cancel = CancellationToken::new();
        execute(self.config, &cancel, |_| operation()).await
    }

    /// Run the operation with retries, giving up as soon as `cancel` fires
    /// during a backoff sleep. The operation receives a clone of the token so
    /// it can observe cancellation itself.
    pub async fn run_with_cancel<F, Fut, T>(
        self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = AttemptResult<T, E>>,
        E: fmt::Debug,
    {
        execute(self.config, cancel, operation).await
    }
}

/// Execute an operation with retries under `policy`.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AttemptResult<T, E>>,
    E: fmt::Debug,
{
    policy.run(operation).await
}

/// Execute an operation with the builder defaults: 3 attempts, exponential
/// backoff from 100ms, system clock.
pub async fn retry<F, Fut, T, E>(operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AttemptResult<T, E>>,
    E: fmt::Debug,
{
    RetryPolicy::builder().build().run(operation).await
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Wait(Duration),
    Stop(StopReason),
}

/// Decide the next step after a transient failure. Checks run in a fixed
/// order: attempt budget, retry condition, time budget, then backoff.
fn next_step<E>(
    config: &CallConfig<'_, E>,
    attempt: u32,
    max_attempts: u32,
    deadline: Option<Instant>,
    error: &E,
) -> Step {
    if attempt >= max_attempts {
        return Step::Stop(StopReason::Exhausted);
    }

    if let Some(condition) = &config.condition {
        if !condition(error) {
            return Step::Stop(StopReason::Rejected);
        }
    }

    let Some(deadline) = deadline else {
        return Step::Wait(config.backoff.delay(attempt));
    };

    let now = config.clock.now();
    if now > deadline {
        return Step::Stop(StopReason::Exhausted);
    }
    let remaining = deadline.saturating_duration_since(now);
    let delay = config.backoff.delay(attempt).min(remaining);
    // A zero delay under a time budget ends the call.
    if delay.is_zero() {
        return Step::Stop(StopReason::Exhausted);
    }
    Step::Wait(delay)
}

fn record<E>(errors: &mut Vec<E>, error: E, collect: bool) {
    if !collect {
        errors.clear();
    }
    errors.push(error);
}

async fn execute<F, Fut, T, E>(
    mut config: CallConfig<'_, E>,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = AttemptResult<T, E>>,
    E: fmt::Debug,
{
    let max_attempts = config.effective_max_attempts();
    let deadline = config.deadline();
    let mut errors = Vec::new();
    let mut attempt: u32 = 1;

    loop {
        debug!(attempt, max_attempts, "Executing retry attempt");

        let error = match operation(cancel.clone()).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retries");
                }
                if let Some(hook) = config.on_success.as_mut() {
                    hook(attempt);
                }
                return Ok(value);
            }
            Err(AttemptError::Terminal(terminal)) => {
                let error = terminal.into_inner();
                warn!(attempt, error = ?error, "Terminal error, not retrying");
                return Err(RetryError::new(vec![error], attempt, StopReason::Terminal));
            }
            Err(AttemptError::Transient(error)) => error,
        };

        match next_step(&config, attempt, max_attempts, deadline, &error) {
            Step::Stop(reason) => {
                if reason == StopReason::Exhausted {
                    warn!(attempt, max_attempts, error = ?error, "Retry exhausted");
                    if let Some(hook) = config.on_exhausted.as_mut() {
                        hook(attempt, &error);
                    }
                } else {
                    warn!(attempt, error = ?error, "Error not retryable");
                }
                record(&mut errors, error, config.collect_errors);
                return Err(RetryError::new(errors, attempt, reason));
            }
            Step::Wait(delay) => {
                debug!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = ?error,
                    "Waiting before retry"
                );
                if let Some(hook) = config.on_retry.as_mut() {
                    hook(attempt, &error, delay);
                }
                record(&mut errors, error, config.collect_errors);

                if config.clock.sleep(delay, cancel).await.is_err() {
                    debug!(attempt, "Retry cancelled during backoff");
                    return Err(RetryError::new(errors, attempt, StopReason::Cancelled));
                }
            }
        }

        attempt = attempt.saturating_add(1);
    }
}
