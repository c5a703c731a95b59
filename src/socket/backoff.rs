//! Delay computation between connection attempts.
//!
//! The schedule is linear in the attempt number, capped, then jittered:
//!
//! ```text
//! n == 0  ->  0
//! n >= 1  ->  capped = min(n * base, max)
//!             capped ± capped * factor   (floored at 0)
//! ```
//!
//! Attempt 0 is the initial connect (or a manual reconnect) and always
//! proceeds immediately.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use super::options::ReconnectOptions;

// ============================================================================
// Backoff
// ============================================================================

/// Backoff policy derived from [`ReconnectOptions`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Base delay, multiplied by the attempt number.
    base: Duration,
    /// Upper bound before jitter.
    max: Duration,
    /// Jitter fraction in `0.0..=1.0`.
    factor: f64,
}

impl Backoff {
    /// Creates a policy from explicit parameters.
    #[inline]
    #[must_use]
    pub const fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Self { base, max, factor }
    }

    /// Creates a policy from socket options.
    #[inline]
    #[must_use]
    pub const fn from_options(options: &ReconnectOptions) -> Self {
        Self::new(
            options.reconnection_delay,
            options.reconnection_delay_max,
            options.randomization_factor,
        )
    }

    /// Returns the delay before attempt `attempt`, with random jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, rand::random::<f64>() * 2.0 - 1.0)
    }

    /// Returns the delay before attempt `attempt` for a jitter sample in `-1.0..=1.0`.
    ///
    /// A sample of `0.0` yields the un-jittered schedule.
    #[must_use]
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let capped = self.capped(attempt);
        if capped.is_zero() || self.factor == 0.0 {
            return capped;
        }

        let capped_secs = capped.as_secs_f64();
        let jitter = capped_secs * self.factor * sample.clamp(-1.0, 1.0);
        Duration::try_from_secs_f64((capped_secs + jitter).max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Returns `min(attempt * base, max)`, or zero for attempt 0.
    #[must_use]
    pub fn capped(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base.saturating_mul(attempt).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_options(&ReconnectOptions::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
