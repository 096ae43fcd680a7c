//! Retry policy for the invocation session

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EvalError, Result};

/// How many times to ask the model, how long to wait in between, and the
/// overall time budget for one case. Attempts and timeout are independent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    #[serde(rename = "initial_backoff_ms", with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "duration_ms")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
    /// Budget for a whole case, across every attempt and backoff
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Reject calls whose arguments fail structural validation
    pub validate_arguments: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(120),
            validate_arguments: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    #[must_use]
    pub fn single_attempt() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, backoff_multiplier: f32) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validate_arguments: bool) -> Self {
        self.validate_arguments = validate_arguments;
        self
    }

    /// Delay before the given retry (1 = the wait after the first attempt)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let mut delay = self.initial_backoff.min(self.max_backoff);
        for _ in 1..retry {
            delay = self.next_backoff(delay);
        }
        delay
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        if current >= self.max_backoff {
            return self.max_backoff;
        }

        let multiplier = self.backoff_multiplier.max(1.0) as f64;
        let scaled = Duration::from_secs_f64(current.as_secs_f64() * multiplier);
        scaled.min(self.max_backoff)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EvalError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if !self.backoff_multiplier.is_finite() {
            return Err(EvalError::Config("retry.backoff_multiplier must be finite".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(EvalError::Config("retry.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
