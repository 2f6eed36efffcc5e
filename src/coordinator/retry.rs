//! Wait policy between acquisition attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Wait `wait_ms` between every attempt (default).
    #[default]
    Fixed,
    /// Multiply the wait by `multiplier` after every attempt.
    Exponential,
}

pub(crate) fn default_max_attempts() -> u32 {
    30
}
pub(crate) fn default_wait_ms() -> u64 {
    10_000
}
pub(crate) fn default_multiplier() -> f64 {
    2.0
}

/// Retry budget and wait schedule for `acquire()`.
///
/// The defaults poll every ten seconds for five minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up with a timeout. Each attempt reads the row once.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base wait between attempts, in milliseconds.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// How the wait grows between attempts.
    #[serde(default)]
    pub backoff: Backoff,

    /// Upper bound for a single wait when backing off exponentially.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,

    /// Growth factor for exponential backoff.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            wait_ms: default_wait_ms(),
            backoff: Backoff::default(),
            max_wait_ms: None,
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// A fixed-wait policy.
    pub fn fixed(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts,
            wait_ms: wait.as_millis().min(u64::MAX as u128) as u64,
            ..Self::default()
        }
    }

    /// Wait after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw_ms = match self.backoff {
            Backoff::Fixed => self.wait_ms,
            Backoff::Exponential => {
                let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
                let scaled = (self.wait_ms as f64) * self.multiplier.powi(exponent);
                if scaled.is_finite() && scaled < u64::MAX as f64 {
                    scaled.round() as u64
                } else {
                    u64::MAX
                }
            }
        };
        let capped_ms = match self.max_wait_ms {
            Some(max_wait_ms) => raw_ms.min(max_wait_ms),
            None => raw_ms,
        };
        Duration::from_millis(capped_ms)
    }
}
