//! Serializable retry settings.
//!
//! [`RetrySettings`] describes a policy as plain data so it can live in a
//! configuration file. Durations are expressed in seconds.
//!
//! ```rust
//! use retrykit::RetrySettings;
//! use std::time::Duration;
//!
//! let settings: RetrySettings = serde_json::from_str(
//!     r#"{ "max_attempts": 5, "strategy": "linear", "base_delay": 0.25, "max_delay": 1.0 }"#,
//! )
//! .unwrap();
//!
//! let policy = settings.into_policy();
//! assert_eq!(policy.max_attempts(), 5);
//! assert_eq!(policy.backoff().delay(2), Duration::from_millis(500));
//! assert_eq!(policy.backoff().delay(9), Duration::from_secs(1));
//! ```

use crate::backoff::{Backoff, Constant, Exponential, Linear, WithCap, WithJitter, WithMin};
use crate::policy::{RetryPolicy, DEFAULT_BASE_DELAY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base delay curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// [`Constant`].
    Constant,
    /// [`Linear`].
    Linear,
    /// [`Exponential`].
    #[default]
    Exponential,
}

/// Plain-data description of a [`RetryPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum attempts, including the first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Total time budget.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub max_duration: Option<Duration>,

    /// Base delay curve.
    #[serde(default)]
    pub strategy: BackoffKind,

    /// Base delay fed to the curve.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub base_delay: Option<Duration>,

    /// Upper bound on any single delay.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub max_delay: Option<Duration>,

    /// Lower bound on any single delay.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub min_delay: Option<Duration>,

    /// Proportional jitter factor (0.2 = ±20%).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
}

impl RetrySettings {
    /// Create empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max attempts.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Set the time budget.
    #[must_use]
    pub fn max_duration(mut self, d: Duration) -> Self {
        self.max_duration = Some(d);
        self
    }

    /// Set the delay curve and its base delay.
    #[must_use]
    pub fn strategy(mut self, kind: BackoffKind, base_delay: Duration) -> Self {
        self.strategy = kind;
        self.base_delay = Some(base_delay);
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Set the delay floor.
    #[must_use]
    pub fn min_delay(mut self, d: Duration) -> Self {
        self.min_delay = Some(d);
        self
    }

    /// Set the jitter factor.
    #[must_use]
    pub fn jitter(mut self, factor: f64) -> Self {
        self.jitter = Some(factor);
        self
    }

    /// Assemble the backoff: base curve, then floor, cap and jitter.
    pub fn backoff(&self) -> Box<dyn Backoff> {
        let base = self.base_delay.unwrap_or(DEFAULT_BASE_DELAY);
        let mut backoff: Box<dyn Backoff> = match self.strategy {
            BackoffKind::Constant => Box::new(Constant::new(base)),
            BackoffKind::Linear => Box::new(Linear::new(base)),
            BackoffKind::Exponential => Box::new(Exponential::new(base)),
        };
        if let Some(min) = self.min_delay {
            backoff = Box::new(WithMin::new(min, backoff));
        }
        if let Some(max) = self.max_delay {
            backoff = Box::new(WithCap::new(max, backoff));
        }
        if let Some(factor) = self.jitter {
            backoff = Box::new(WithJitter::new(factor, backoff));
        }
        backoff
    }

    /// Build a policy using the system clock.
    pub fn into_policy(self) -> RetryPolicy {
        let mut builder = RetryPolicy::builder().backoff(self.backoff());
        if let Some(n) = self.max_attempts {
            builder = builder.max_attempts(n);
        }
        if let Some(d) = self.max_duration {
            builder = builder.max_duration(d);
        }
        builder.build()
    }
}

mod option_duration_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_secs_f64().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<f64> = Option::deserialize(deserializer)?;
        opt.map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
