//! Exponential backoff with full jitter for queue job retries.

use std::time::Duration;

use rand::Rng;

/// Retry policy for the ingestion queue (base 1s, factor 2, cap 60s).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: i32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_attempts: i32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before the given attempt (1-based), full-jitter strategy:
    /// `random(0, min(cap, base * 2^(attempt-1)))`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        if attempt <= 0 {
            return Duration::from_millis(0);
        }

        let shift = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(16);
        let exponential_delay = self.base_delay_ms.saturating_mul(1_u64 << shift);
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let jittered_delay = if capped_delay > 0 {
            rand::rng().random_range(0..=capped_delay)
        } else {
            0
        };

        Duration::from_millis(jittered_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts were made.
    #[must_use]
    pub const fn can_retry(&self, attempt: i32) -> bool {
        attempt < self.max_attempts
    }
}
