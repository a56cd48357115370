//! Backoff strategies for reconnect loops and HTTP retries.

use std::time::Duration;

/// Delay schedule between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed(Duration),
    /// `initial * factor^attempt`, capped at `max_delay`.
    Exponential { initial_delay: Duration, factor: u32, max_delay: Duration },
}

impl BackoffStrategy {
    /// Doubling backoff starting at `initial_delay`.
    pub const fn doubling(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential { initial_delay, factor: 2, max_delay }
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { initial_delay, factor, max_delay } => {
                let multiplier = factor.checked_pow(attempt).unwrap_or(u32::MAX);
                initial_delay.checked_mul(multiplier).map_or(max_delay, |d| d.min(max_delay))
            }
        }
    }
}
