use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry-relevant category of a single attempt's outcome.
///
/// The executor never derives this on its own; it always comes from a
/// caller-supplied [`Classify`] implementation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    /// The outcome is usable, stop retrying
    Success,
    /// A connection problem, timeout or server error that may clear up
    RetryableTransient,
    /// The remote side is throttling us; back off harder before the next attempt
    RetryableRateLimited,
    /// Retrying will not help
    Permanent,
}

impl Classification {
    /// Returns `true` for [`Classification::Success`]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns `true` if another attempt may produce a different outcome
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableTransient | Self::RetryableRateLimited)
    }
}

/// Maps a raw attempt outcome to a [`Classification`].
///
/// `classify` takes `&mut self` so an implementation can escalate based on
/// what it has seen before, e.g. a run of `403` responses.
pub trait Classify<O> {
    /// Classify the outcome of one attempt
    fn classify(&mut self, outcome: &O) -> Classification;

    /// Minimum wait the remote side asked for before the next attempt
    fn retry_after(&self, _outcome: &O) -> Option<Duration> {
        None
    }
}

impl<O, C: Classify<O> + ?Sized> Classify<O> for Box<C> {
    fn classify(&mut self, outcome: &O) -> Classification {
        (**self).classify(outcome)
    }

    fn retry_after(&self, outcome: &O) -> Option<Duration> {
        (**self).retry_after(outcome)
    }
}

impl<O, C: Classify<O> + ?Sized> Classify<O> for &mut C {
    fn classify(&mut self, outcome: &O) -> Classification {
        (**self).classify(outcome)
    }

    fn retry_after(&self, outcome: &O) -> Option<Duration> {
        (**self).retry_after(outcome)
    }
}

/// A [`Classify`] implementation backed by a closure, see [`from_fn`]
#[derive(Debug, Clone, Copy)]
pub struct FromFn<F>(F);

/// Build a classifier from a closure.
///
/// ```
/// use vnfetch_lib::{Classification, Classify, from_fn};
///
/// let mut classifier = from_fn(|status: &u16| match status {
///     200 => Classification::Success,
///     429 => Classification::RetryableRateLimited,
///     500.. => Classification::RetryableTransient,
///     _ => Classification::Permanent,
/// });
/// assert_eq!(classifier.classify(&503), Classification::RetryableTransient);
/// ```
pub const fn from_fn<F>(f: F) -> FromFn<F> {
    FromFn(f)
}

impl<O, F> Classify<O> for FromFn<F>
where
    F: FnMut(&O) -> Classification,
{
    fn classify(&mut self, outcome: &O) -> Classification {
        (self.0)(outcome)
    }
}
