//! Time source used by the retry loop.
//!
//! [`SystemClock`] reads real time and sleeps on the tokio timer.
//! [`ManualClock`] keeps logical time for tests: sleeping records the request
//! and advances the clock without suspending.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A sleep was interrupted by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sleep cancelled")]
pub struct Cancelled;

/// Abstracts reading the time and sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Sleep for `duration` or until `cancel` fires, whichever comes first.
    ///
    /// A zero duration returns `Ok(())` immediately.
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled>;
}

/// Wall-clock time with tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a system clock.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[derive(Debug)]
struct ManualState {
    start: Instant,
    now: Instant,
    sleeps: Vec<Duration>,
}

/// Logical clock for deterministic tests.
///
/// Clones share the same time, so a test can hold one handle while the
/// policy owns another:
///
/// ```rust
/// use retrykit::{AttemptError, Exponential, ManualClock, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let clock = ManualClock::new();
/// let policy = RetryPolicy::builder()
///     .max_attempts(4)
///     .backoff(Exponential::new(Duration::from_millis(100)))
///     .clock(clock.clone())
///     .build();
///
/// let result = policy
///     .run(|| async { Err::<(), _>(AttemptError::from("down")) })
///     .await;
/// assert!(result.is_err());
/// assert_eq!(
///     clock.sleeps(),
///     vec![
///         Duration::from_millis(100),
///         Duration::from_millis(200),
///         Duration::from_millis(400),
///     ]
/// );
/// assert_eq!(clock.elapsed(), Duration::from_millis(700));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock starting at the current instant.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            state: Arc::new(Mutex::new(ManualState {
                start: now,
                now,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move logical time forward, e.g. to simulate a slow operation.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.now = advance_saturating(state.now, duration);
    }

    /// Every duration passed to [`Clock::sleep`] so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    /// Logical time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        let state = self.state.lock();
        state.now.saturating_duration_since(state.start)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut state = self.state.lock();
        if duration.is_zero() {
            state.sleeps.push(duration);
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        state.sleeps.push(duration);
        state.now = advance_saturating(state.now, duration);
        Ok(())
    }
}

// Instant has no saturating_add; step back in halves until it fits.
fn advance_saturating(from: Instant, mut by: Duration) -> Instant {
    loop {
        if let Some(next) = from.checked_add(by) {
            return next;
        }
        by /= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_system_clock_sleeps() {
        let clock = SystemClock::new();
        let token = CancellationToken::new();
        let start = Instant::now();

        clock.sleep(Duration::from_millis(20), &token).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_system_clock_zero_duration() {
        let clock = SystemClock::new();
        let token = CancellationToken::new();
        token.cancel();

        // Zero wins over an already-fired token.
        assert_eq!(clock.sleep(Duration::ZERO, &token).await, Ok(()));
    }

    #[tokio::test]
    async fn test_system_clock_cancelled_mid_sleep() {
        let clock = SystemClock::new();
        let token = CancellationToken::new();
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = clock.sleep(Duration::from_secs(30), &token).await;
        assert_eq!(result, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_system_clock_huge_duration_cancellable() {
        let clock = SystemClock::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = clock.sleep(Duration::MAX, &token).await;
        assert_eq!(result, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_manual_clock_records_and_advances() {
        let clock = ManualClock::new();
        let token = CancellationToken::new();
        let start = clock.now();

        clock.sleep(Duration::from_millis(50), &token).await.unwrap();
        clock.advance(Duration::from_millis(25));
        clock.sleep(Duration::from_millis(100), &token).await.unwrap();

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(50), Duration::from_millis(100)]
        );
        assert_eq!(clock.now() - start, Duration::from_millis(175));
        assert_eq!(clock.elapsed(), Duration::from_millis(175));
    }

    #[tokio::test]
    async fn test_manual_clock_cancelled() {
        let clock = ManualClock::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = clock.sleep(Duration::from_secs(1), &token).await;
        assert_eq!(result, Err(Cancelled));
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        handle.advance(Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_manual_clock_advance_saturates() {
        let clock = ManualClock::new();
        clock.advance(Duration::MAX);
        assert!(clock.elapsed() > Duration::from_secs(1));
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(Cancelled.to_string(), "sleep cancelled");
    }
}
