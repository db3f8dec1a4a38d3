//! # retrykit
//!
//! Composable retries for fallible async operations.
//!
//! An operation is a closure returning a future of [`AttemptResult`]. A
//! [`RetryPolicy`] invokes it until it succeeds, returns a terminal error, or
//! runs out of attempts or time, sleeping between attempts for as long as its
//! [`Backoff`] says.
//!
//! ## Core Concepts
//!
//! - **[`Backoff`]**: Maps an attempt number to a delay
//! - **[`Clock`]**: Time source and cancellable sleep
//! - **[`RetryPolicy`]**: Attempt and duration budgets plus a backoff
//! - **[`Retry`]**: One call with its predicate, hooks and overrides
//! - **[`stop`]**: Mark an error as not worth retrying
//!
//! ## Backoff Strategies
//!
//! - [`Constant`]: Same delay every time
//! - [`Linear`]: `base * attempt`
//! - [`Exponential`]: `base * 2^(attempt - 1)`
//! - [`WithCap`], [`WithMin`], [`WithJitter`]: Bound or randomize another strategy
//! - [`from_fn`]: Any closure
//!
//! ## Example
//!
//! ```rust
//! use retrykit::{stop, AttemptError, BackoffExt, Exponential, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(4)
//!     .backoff(Exponential::new(Duration::from_millis(1)).with_jitter(0.1))
//!     .build();
//!
//! let mut calls = 0;
//! let result = policy
//!     .retry()
//!     .on_retry(|attempt, err: &String, delay| {
//!         println!("attempt {} failed: {}; waiting {:?}", attempt, err, delay);
//!     })
//!     .run(|| {
//!         calls += 1;
//!         let n = calls;
//!         async move {
//!             match n {
//!                 1 => Err(AttemptError::from("connection reset".to_string())),
//!                 2 => Err(stop("bad request".to_string())),
//!                 _ => Ok(()),
//!             }
//!         }
//!     })
//!     .await;
//!
//! let err = result.unwrap_err();
//! assert_eq!(err.attempts(), 2);
//! assert_eq!(err.last(), "bad request");
//! # });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod clock;
mod config;
pub mod error;
pub mod executor;
pub mod policy;
pub mod settings;

// Re-exports
pub use backoff::{
    from_fn, Backoff, BackoffExt, BackoffFn, Constant, Exponential, Linear, WithCap, WithJitter,
    WithMin,
};
pub use clock::{Cancelled, Clock, ManualClock, SystemClock};
pub use error::{stop, AttemptError, AttemptResult, IntoAttempt, RetryError, StopReason, Terminal};
pub use executor::{retry, with_retry, Retry};
pub use policy::{
    RetryPolicy, RetryPolicyBuilder, DEFAULT_BASE_DELAY, DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY,
};
pub use settings::{BackoffKind, RetrySettings};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        stop, with_retry, AttemptError, AttemptResult, Backoff, BackoffExt, Constant,
        Exponential, IntoAttempt, Linear, RetryError, RetryPolicy, StopReason,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let policy = RetryPolicy::builder()
            .backoff(Constant::new(Duration::from_secs(1)).with_cap(Duration::from_millis(500)))
            .build();
        assert_eq!(policy.backoff().delay(1), Duration::from_millis(500));
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(policy.max_duration(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_from_closure() {
        let backoff = from_fn(|attempt| Duration::from_secs(u64::from(attempt) * 3));
        assert_eq!(backoff.delay(2), Duration::from_secs(6));
    }
}
