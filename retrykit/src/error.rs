//! Retry error types.
//!
//! Operations report failures as [`AttemptError`]: a plain error converts into
//! [`AttemptError::Transient`] (so `?` works inside the operation), while
//! [`stop`] marks an error as terminal. When the loop gives up it returns a
//! [`RetryError`] carrying the operation's own error(s), never one of its own.

use std::error::Error as StdError;
use std::fmt;

/// Why the retry loop ended without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The attempt or duration budget ran out.
    Exhausted,
    /// The operation returned a terminal error.
    Terminal,
    /// The retry predicate rejected the error.
    Rejected,
    /// The cancellation token fired while waiting between attempts.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exhausted => "exhausted",
            Self::Terminal => "terminal",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Marks an error as non-retryable.
///
/// Displays as the wrapped error and reports it as its `source()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal<E>(E);

impl<E> Terminal<E> {
    /// Wrap an error.
    pub fn new(error: E) -> Self {
        Self(error)
    }

    /// Get a reference to the wrapped error.
    pub fn get_ref(&self) -> &E {
        &self.0
    }

    /// Unwrap the original error.
    pub fn into_inner(self) -> E {
        self.0
    }
}

impl<E: fmt::Display> fmt::Display for Terminal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<E: StdError + 'static> StdError for Terminal<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.0)
    }
}

/// Failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// Eligible for another attempt.
    Transient(E),
    /// Ends the retry loop immediately.
    Terminal(Terminal<E>),
}

impl<E> AttemptError<E> {
    /// A retry-eligible failure.
    pub fn transient(error: E) -> Self {
        Self::Transient(error)
    }

    /// A failure that must not be retried.
    pub fn terminal(error: E) -> Self {
        Self::Terminal(Terminal::new(error))
    }

    /// Check whether this failure stops the loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// Get a reference to the underlying error.
    pub fn get_ref(&self) -> &E {
        match self {
            Self::Transient(e) => e,
            Self::Terminal(t) => t.get_ref(),
        }
    }

    /// Discard the marker and return the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(e) => e,
            Self::Terminal(t) => t.into_inner(),
        }
    }
}

impl<E> From<E> for AttemptError<E> {
    fn from(error: E) -> Self {
        Self::Transient(error)
    }
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get_ref().fmt(f)
    }
}

impl<E: StdError + 'static> StdError for AttemptError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Transient(e) => e.source(),
            Self::Terminal(t) => t.source(),
        }
    }
}

/// Mark `error` as terminal: the retry loop returns it without further attempts.
///
/// ```rust
/// use retrykit::{stop, RetryPolicy, StopReason};
///
/// # tokio_test::block_on(async {
/// let err = RetryPolicy::default()
///     .run(|| async { Err::<(), _>(stop("invalid credentials")) })
///     .await
///     .unwrap_err();
///
/// assert_eq!(err.reason(), StopReason::Terminal);
/// assert_eq!(err.attempts(), 1);
/// assert_eq!(*err.last(), "invalid credentials");
/// # });
/// ```
pub fn stop<E>(error: E) -> AttemptError<E> {
    AttemptError::terminal(error)
}

/// Result type for a single attempt.
pub type AttemptResult<T, E> = Result<T, AttemptError<E>>;

/// Classify the error of an ordinary `Result` for the retry loop.
pub trait IntoAttempt<T, E> {
    /// Treat the error as retryable.
    fn transient(self) -> AttemptResult<T, E>;

    /// Treat the error as terminal.
    fn terminal(self) -> AttemptResult<T, E>;
}

impl<T, E> IntoAttempt<T, E> for Result<T, E> {
    fn transient(self) -> AttemptResult<T, E> {
        self.map_err(AttemptError::Transient)
    }

    fn terminal(self) -> AttemptResult<T, E> {
        self.map_err(AttemptError::terminal)
    }
}

/// Error returned when the retry loop gives up.
///
/// Holds the most recent failure, or every failure in order when error
/// collection is enabled. A terminal error is always reported alone.
/// With a single error, `Display` and `source()` are those of that error.
#[derive(Debug, Clone)]
pub struct RetryError<E> {
    errors: Vec<E>,
    attempts: u32,
    reason: StopReason,
}

impl<E> RetryError<E> {
    pub(crate) fn new(errors: Vec<E>, attempts: u32, reason: StopReason) -> Self {
        debug_assert!(!errors.is_empty(), "RetryError without errors");
        Self {
            errors,
            attempts,
            reason,
        }
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Why the loop stopped.
    pub fn reason(&self) -> StopReason {
        self.reason
    }

    /// The most recent failure.
    pub fn last(&self) -> &E {
        &self.errors[self.errors.len() - 1]
    }

    /// All surfaced failures, oldest first.
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    /// Whether more than one failure is held.
    pub fn is_aggregate(&self) -> bool {
        self.errors.len() > 1
    }

    /// Check whether any surfaced failure matches `predicate`.
    pub fn any<P>(&self, predicate: P) -> bool
    where
        P: FnMut(&E) -> bool,
    {
        self.errors.iter().any(predicate)
    }

    /// Check whether `error` is among the surfaced failures.
    pub fn contains(&self, error: &E) -> bool
    where
        E: PartialEq,
    {
        self.errors.contains(error)
    }

    /// Take the most recent failure.
    pub fn into_last(mut self) -> E {
        // Never empty: every constructor pushes at least one error.
        self.errors.swap_remove(self.errors.len() - 1)
    }

    /// Take all surfaced failures, oldest first.
    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.errors.as_slice() {
            [single] => single.source(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Clone, Error, PartialEq)]
    #[error("boom {0}")]
    struct Boom(u32);

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Boom);

    #[test]
    fn test_terminal_preserves_error() {
        let t = Terminal::new(Boom(1));
        assert_eq!(t.to_string(), "boom 1");
        assert_eq!(t.get_ref(), &Boom(1));
        let source = t.source().unwrap();
        assert_eq!(source.downcast_ref::<Boom>(), Some(&Boom(1)));
        assert_eq!(t.into_inner(), Boom(1));
    }

    #[test]
    fn test_attempt_error_conversions() {
        let transient: AttemptError<Boom> = Boom(1).into();
        assert!(!transient.is_terminal());
        assert_eq!(transient.to_string(), "boom 1");

        let terminal = stop(Boom(2));
        assert!(terminal.is_terminal());
        assert_eq!(terminal.get_ref(), &Boom(2));
        assert_eq!(terminal.into_inner(), Boom(2));
    }

    #[test]
    fn test_question_mark_is_transient() {
        fn op() -> AttemptResult<(), Boom> {
            Err::<(), _>(Boom(7))?;
            Ok(())
        }
        assert_eq!(op(), Err(AttemptError::Transient(Boom(7))));
    }

    #[test]
    fn test_into_attempt() {
        let r: Result<(), Boom> = Err(Boom(3));
        assert!(!r.clone().transient().unwrap_err().is_terminal());
        assert!(r.terminal().unwrap_err().is_terminal());

        let ok: Result<u8, Boom> = Ok(1);
        assert_eq!(ok.terminal(), Ok(1));
    }

    #[test]
    fn test_retry_error_single_is_transparent() {
        let err = RetryError::new(vec![Outer(Boom(4))], 3, StopReason::Exhausted);
        assert_eq!(err.to_string(), "outer");
        assert!(!err.is_aggregate());
        let source = err.source().unwrap();
        assert_eq!(source.downcast_ref::<Boom>(), Some(&Boom(4)));
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.reason(), StopReason::Exhausted);
    }

    #[test]
    fn test_retry_error_aggregate() {
        let err = RetryError::new(vec![Boom(1), Boom(2), Boom(3)], 3, StopReason::Exhausted);
        assert_eq!(err.to_string(), "boom 1\nboom 2\nboom 3");
        assert!(err.is_aggregate());
        assert!(err.contains(&Boom(1)));
        assert!(err.contains(&Boom(3)));
        assert!(!err.contains(&Boom(4)));
        assert!(err.any(|e| e.0 == 2));
        assert_eq!(err.last(), &Boom(3));
        assert!(err.source().is_none());
        assert_eq!(err.clone().into_last(), Boom(3));
        assert_eq!(err.into_errors(), vec![Boom(1), Boom(2), Boom(3)]);
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Cancelled.to_string(), "cancelled");
        assert_eq!(StopReason::Rejected.to_string(), "rejected");
    }
}
