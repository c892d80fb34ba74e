//! Exponential backoff with jitter.

use std::time::Duration;

/// Delay schedule between attempts.
///
/// The nominal delay for retry `n` (zero-based) is `base * 2^n`, capped at
/// `max`. A jitter sample is added on top and the sum is capped at `max`
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: Duration,
}

impl Backoff {
    /// Create a schedule. `max` below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter,
        }
    }

    /// Delay before the first retry
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound for every delay
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Upper bound for the random term added to each delay
    #[must_use]
    pub const fn jitter(&self) -> Duration {
        self.jitter
    }

    /// `min(base * 2^retry, max)`, saturating at `max` on overflow
    #[must_use]
    pub fn nominal(&self, retry: u32) -> Duration {
        2u32.checked_pow(retry)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Nominal delay plus `jitter_sample`, capped at `max`
    #[must_use]
    pub fn delay(&self, retry: u32, jitter_sample: Duration) -> Duration {
        self.nominal(retry).saturating_add(jitter_sample).min(self.max)
    }
}
