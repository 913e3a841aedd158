//! Exponential backoff with jitter for transient failures
//!
//! The delay is a pure function of the attempt number; the client decides
//! whether to retry and sleeps cooperatively with `tokio::time::sleep`.

use std::fmt;
use std::time::Duration;

use rand::Rng;

/// Retry policy for calls against a single model
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries per model call, including the first (minimum 1)
    pub max_attempts: u32,

    /// Delay before the first retry, before jitter
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Relative jitter; 0.25 samples factors from [0.75, 1.25]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryPolicy {{ max_attempts: {}, base_delay: {:?}, max_delay: {:?}, jitter: {} }}",
            self.max_attempts, self.base_delay, self.max_delay, self.jitter
        )
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Effective number of tries
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Jittered delay to wait after failed try number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };
        backoff_delay(self.base_delay, attempt, factor, self.max_delay)
    }
}

/// `min(base × 2^attempt × factor, max)`
pub fn backoff_delay(base: Duration, attempt: u32, factor: f64, max: Duration) -> Duration {
    let exponent = 2f64.powi(attempt.min(32) as i32);
    let secs = base.as_secs_f64() * exponent * factor.max(0.0);
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(secs)
    }
}
