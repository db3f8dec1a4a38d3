//! Per-call retry configuration.

use crate::backoff::Backoff;
use crate::clock::Clock;
use crate::policy::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decides whether an error is worth another attempt.
pub(crate) type Condition<'a, E> = Box<dyn Fn(&E) -> bool + Send + Sync + 'a>;
/// Called before each sleep with `(attempt, error, delay)`.
pub(crate) type OnRetry<'a, E> = Box<dyn FnMut(u32, &E, Duration) + Send + 'a>;
/// Called with the attempt count that succeeded.
pub(crate) type OnSuccess<'a> = Box<dyn FnMut(u32) + Send + 'a>;
/// Called with the final attempt count and error when a budget runs out.
pub(crate) type OnExhausted<'a, E> = Box<dyn FnMut(u32, &E) + Send + 'a>;

/// Configuration for one invocation: the policy's settings plus call-site
/// overrides. Built fresh per call and consumed by the executor.
pub(crate) struct CallConfig<'a, E> {
    pub(crate) max_attempts: u32,
    pub(crate) max_duration: Duration,
    pub(crate) backoff: Arc<dyn Backoff>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) condition: Option<Condition<'a, E>>,
    pub(crate) on_retry: Option<OnRetry<'a, E>>,
    pub(crate) on_success: Option<OnSuccess<'a>>,
    pub(crate) on_exhausted: Option<OnExhausted<'a, E>>,
    pub(crate) collect_errors: bool,
}

impl<'a, E> CallConfig<'a, E> {
    pub(crate) fn from_policy(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts(),
            max_duration: policy.max_duration(),
            backoff: Arc::clone(policy.backoff()),
            clock: Arc::clone(policy.clock()),
            condition: None,
            on_retry: None,
            on_success: None,
            on_exhausted: None,
            collect_errors: false,
        }
    }

    /// Attempt cap, with zero replaced by the default.
    pub(crate) fn effective_max_attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            self.max_attempts
        }
    }

    /// Deadline for the whole call, if a duration budget is set.
    ///
    /// A budget too large to represent is treated as unbounded.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        if self.max_duration.is_zero() {
            return None;
        }
        self.clock.now().checked_add(self.max_duration)
    }
}

impl<E> fmt::Debug for CallConfig<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallConfig")
            .field("max_attempts", &self.max_attempts)
            .field("max_duration", &self.max_duration)
            .field("has_condition", &self.condition.is_some())
            .field("has_on_retry", &self.on_retry.is_some())
            .field("has_on_success", &self.on_success.is_some())
            .field("has_on_exhausted", &self.on_exhausted.is_some())
            .field("collect_errors", &self.collect_errors)
            .finish()
    }
}
