//! Backoff strategies.
//!
//! A [`Backoff`] maps the number of the attempt that just failed (1-based) to
//! the delay before the next attempt. Base strategies ([`Constant`],
//! [`Linear`], [`Exponential`]) are composed by wrapping them in
//! [`WithCap`], [`WithMin`] and [`WithJitter`], either directly or through
//! the fluent [`BackoffExt`] methods:
//!
//! ```rust
//! use retrykit::backoff::{Backoff, BackoffExt, Exponential};
//! use std::time::Duration;
//!
//! let backoff = Exponential::new(Duration::from_millis(100))
//!     .with_cap(Duration::from_secs(1))
//!     .with_min(Duration::from_millis(250));
//!
//! assert_eq!(backoff.delay(1), Duration::from_millis(250));
//! assert_eq!(backoff.delay(3), Duration::from_millis(400));
//! assert_eq!(backoff.delay(10), Duration::from_secs(1));
//! ```

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Attempts past this point make exponential growth saturate.
const MAX_DOUBLINGS: u32 = 62;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Calculates the delay between retry attempts.
pub trait Backoff: Send + Sync {
    /// Delay to wait after the given (1-based) attempt failed.
    fn delay(&self, attempt: u32) -> Duration;
}

impl<B: Backoff + ?Sized> Backoff for Box<B> {
    fn delay(&self, attempt: u32) -> Duration {
        (**self).delay(attempt)
    }
}

impl<B: Backoff + ?Sized> Backoff for Arc<B> {
    fn delay(&self, attempt: u32) -> Duration {
        (**self).delay(attempt)
    }
}

/// Fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant {
    delay: Duration,
}

impl Constant {
    /// Create a constant backoff.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for Constant {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Linearly increasing delay: `base * attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear {
    base: Duration,
}

impl Linear {
    /// Create a linear backoff.
    #[must_use]
    pub fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl Backoff for Linear {
    fn delay(&self, attempt: u32) -> Duration {
        saturating_from_nanos(self.base.as_nanos().saturating_mul(u128::from(attempt)))
    }
}

/// Doubling delay: `base * 2^(attempt - 1)`.
///
/// Attempt `0` yields `base`. Growth saturates at [`Duration::MAX`] once the
/// attempt exceeds 62 or the product no longer fits, so the delay never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponential {
    base: Duration,
}

impl Exponential {
    /// Create an exponential backoff.
    #[must_use]
    pub fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl Backoff for Exponential {
    fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base;
        }
        if attempt > MAX_DOUBLINGS {
            return Duration::MAX;
        }
        self.base
            .as_nanos()
            .checked_mul(1u128 << (attempt - 1))
            .map_or(Duration::MAX, saturating_from_nanos)
    }
}

/// Caps the inner delay at `max`.
#[derive(Debug, Clone)]
pub struct WithCap<B> {
    max: Duration,
    inner: B,
}

impl<B: Backoff> WithCap<B> {
    /// Wrap `inner` so its delay never exceeds `max`.
    #[must_use]
    pub fn new(max: Duration, inner: B) -> Self {
        Self { max, inner }
    }
}

impl<B: Backoff> Backoff for WithCap<B> {
    fn delay(&self, attempt: u32) -> Duration {
        self.inner.delay(attempt).min(self.max)
    }
}

/// Raises the inner delay to at least `min`.
#[derive(Debug, Clone)]
pub struct WithMin<B> {
    min: Duration,
    inner: B,
}

impl<B: Backoff> WithMin<B> {
    /// Wrap `inner` so its delay is never below `min`.
    #[must_use]
    pub fn new(min: Duration, inner: B) -> Self {
        Self { min, inner }
    }
}

impl<B: Backoff> Backoff for WithMin<B> {
    fn delay(&self, attempt: u32) -> Duration {
        self.inner.delay(attempt).max(self.min)
    }
}

/// Adds `±factor` proportional jitter to the inner delay.
///
/// With `factor = 0.2` a 100ms delay becomes a uniform draw from 80ms..=120ms.
/// A factor that is not strictly positive disables jitter entirely. The result
/// is clamped at zero and saturates at [`Duration::MAX`].
pub struct WithJitter<B> {
    factor: f64,
    inner: B,
    rng: Option<Mutex<StdRng>>,
}

impl<B: Backoff> WithJitter<B> {
    /// Jitter drawn from the thread-local generator.
    #[must_use]
    pub fn new(factor: f64, inner: B) -> Self {
        Self {
            factor,
            inner,
            rng: None,
        }
    }

    /// Jitter drawn from a generator seeded with `seed`, for reproducible delays.
    #[must_use]
    pub fn seeded(factor: f64, inner: B, seed: u64) -> Self {
        Self {
            factor,
            inner,
            rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// The configured jitter factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Uniform sample in `[-1.0, 1.0]`.
    fn sample(&self) -> f64 {
        match &self.rng {
            Some(rng) => rng.lock().gen_range(-1.0..=1.0),
            None => rand::thread_rng().gen_range(-1.0..=1.0),
        }
    }
}

impl<B: Backoff> Backoff for WithJitter<B> {
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.inner.delay(attempt);
        // NaN falls through here too.
        if !(self.factor > 0.0) {
            return delay;
        }

        let base = delay.as_secs_f64();
        let jittered = base + self.sample() * base * self.factor;
        if jittered <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(jittered).unwrap_or(Duration::MAX)
    }
}

impl<B: fmt::Debug> fmt::Debug for WithJitter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithJitter")
            .field("factor", &self.factor)
            .field("inner", &self.inner)
            .field("seeded", &self.rng.is_some())
            .finish()
    }
}

/// Adapter that lets a plain function act as a [`Backoff`].
#[derive(Clone, Copy)]
pub struct BackoffFn<F> {
    f: F,
}

impl<F> fmt::Debug for BackoffFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffFn").finish_non_exhaustive()
    }
}

impl<F> Backoff for BackoffFn<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        (self.f)(attempt)
    }
}

/// Build a backoff from a function, for curves the built-ins don't cover.
///
/// ```rust
/// use retrykit::backoff::{from_fn, Backoff};
/// use std::time::Duration;
///
/// // Quadratic growth.
/// let backoff = from_fn(|attempt| Duration::from_millis(10) * attempt * attempt);
/// assert_eq!(backoff.delay(3), Duration::from_millis(90));
/// ```
pub fn from_fn<F>(f: F) -> BackoffFn<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    BackoffFn { f }
}

/// Fluent wrappers available on every [`Backoff`].
pub trait BackoffExt: Backoff + Sized {
    /// See [`WithCap`].
    #[must_use]
    fn with_cap(self, max: Duration) -> WithCap<Self> {
        WithCap::new(max, self)
    }

    /// See [`WithMin`].
    #[must_use]
    fn with_min(self, min: Duration) -> WithMin<Self> {
        WithMin::new(min, self)
    }

    /// See [`WithJitter`].
    #[must_use]
    fn with_jitter(self, factor: f64) -> WithJitter<Self> {
        WithJitter::new(factor, self)
    }
}

impl<B: Backoff> BackoffExt for B {}

fn saturating_from_nanos(nanos: u128) -> Duration {
    let secs = nanos / NANOS_PER_SEC;
    match u64::try_from(secs) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}
