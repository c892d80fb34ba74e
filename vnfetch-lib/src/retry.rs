//! The retry loop.
//!
//! [`Executor::execute`] runs an operation until its outcome is classified
//! as a success, as permanent, or until the attempt budget is spent. Every
//! attempt is admitted by the shared [`RateLimiter`] and presents an
//! identity drawn from the [`IdentityRotator`]; retries sleep according to
//! the [`Backoff`] schedule.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::cancel::Cancellation;
use crate::identity::{IdentityProfile, IdentityRotator};
use crate::ratelimit::RateLimiter;
use crate::stats::ExecutorStats;
use crate::{Classification, Classify, ErrorKind, ExecutorConfig, Fault, Result};

/// Attempt budget and delay schedule for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` attempts in total
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if `max_attempts` is 0,
    /// `base_delay` is zero or `max_delay` is below `base_delay`.
    pub fn new(
        max_attempts: usize,
        base_delay: Duration,
        max_delay: Duration,
        jitter: Duration,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(ErrorKind::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if base_delay.is_zero() {
            return Err(ErrorKind::InvalidConfig(
                "base_delay must be greater than 0".into(),
            ));
        }
        if max_delay < base_delay {
            return Err(ErrorKind::InvalidConfig(format!(
                "max_delay ({max_delay:?}) must not be below base_delay ({base_delay:?})"
            )));
        }
        Ok(Self {
            max_attempts,
            backoff: Backoff::new(base_delay, max_delay, jitter),
        })
    }

    /// Maximum number of attempts, the first one included
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// The delay schedule between attempts
    #[must_use]
    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }
}

/// What an operation gets to know about the attempt it is running
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Zero-based attempt index
    pub index: usize,
    /// Backoff delay slept before this attempt
    pub delay: Duration,
    /// Identity to present with this attempt
    pub profile: Arc<IdentityProfile>,
}

impl Attempt {
    /// Returns `true` for every attempt after the first
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        self.index > 0
    }
}

/// Result of an execution
#[must_use]
#[derive(Debug)]
pub enum Execution<O> {
    /// The last outcome was classified as a success
    Success {
        /// The successful outcome
        value: O,
        /// Number of attempts made
        attempts: usize,
    },
    /// The last outcome was classified as permanent
    PermanentFailure {
        /// The failing outcome
        outcome: O,
        /// Number of attempts made
        attempts: usize,
    },
    /// Every attempt was retryable and the budget ran out
    BudgetExhausted {
        /// Outcome of the last attempt
        outcome: O,
        /// Number of attempts made
        attempts: usize,
        /// Classification of the last attempt
        last: Classification,
    },
    /// The cancellation fired before the execution finished
    Cancelled {
        /// Number of attempts started, including one cut short
        attempts: usize,
        /// Classification of the last finished attempt
        last: Option<Classification>,
    },
}

impl<O> Execution<O> {
    /// Number of attempts made
    #[must_use]
    pub const fn attempts(&self) -> usize {
        match self {
            Self::Success { attempts, .. }
            | Self::PermanentFailure { attempts, .. }
            | Self::BudgetExhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Classification of the last finished attempt
    #[must_use]
    pub const fn last_classification(&self) -> Option<Classification> {
        match self {
            Self::Success { .. } => Some(Classification::Success),
            Self::PermanentFailure { .. } => Some(Classification::Permanent),
            Self::BudgetExhausted { last, .. } => Some(*last),
            Self::Cancelled { last, .. } => *last,
        }
    }

    /// Returns `true` for [`Execution::Success`]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns `true` for [`Execution::Cancelled`]
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The last outcome, successful or not
    #[must_use]
    pub const fn outcome(&self) -> Option<&O> {
        match self {
            Self::Success { value: outcome, .. }
            | Self::PermanentFailure { outcome, .. }
            | Self::BudgetExhausted { outcome, .. } => Some(outcome),
            Self::Cancelled { .. } => None,
        }
    }

    /// The successful value, if any
    #[must_use]
    pub fn into_value(self) -> Option<O> {
        match self {
            Self::Success { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Map the outcome, keeping attempt counts and classifications
    pub fn map<P>(self, f: impl FnOnce(O) -> P) -> Execution<P> {
        match self {
            Self::Success { value, attempts } => Execution::Success {
                value: f(value),
                attempts,
            },
            Self::PermanentFailure { outcome, attempts } => Execution::PermanentFailure {
                outcome: f(outcome),
                attempts,
            },
            Self::BudgetExhausted {
                outcome,
                attempts,
                last,
            } => Execution::BudgetExhausted {
                outcome: f(outcome),
                attempts,
                last,
            },
            Self::Cancelled { attempts, last } => Execution::Cancelled { attempts, last },
        }
    }
}

impl<T> Execution<std::result::Result<T, Fault>> {
    /// Flatten into the crate [`Result`]
    ///
    /// # Errors
    ///
    /// Every variant except a successful `Ok` outcome becomes an error. A
    /// success holding an `Err` (a classifier that accepts faults) becomes
    /// [`ErrorKind::Fault`].
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success { value, .. } => value.map_err(ErrorKind::from),
            Self::PermanentFailure { outcome, attempts } => Err(ErrorKind::PermanentFailure {
                attempts,
                fault: outcome.err(),
            }),
            Self::BudgetExhausted {
                outcome,
                attempts,
                last,
            } => Err(ErrorKind::BudgetExhausted {
                attempts,
                last,
                fault: outcome.err(),
            }),
            Self::Cancelled { attempts, .. } => Err(ErrorKind::Cancelled { attempts }),
        }
    }
}

/// Rate limited, identity rotating retry executor.
///
/// One executor is meant to be shared (e.g. behind an [`Arc`]) by everything
/// talking to the same remote service, so they all draw from one rate
/// budget.
#[derive(Debug)]
pub struct Executor {
    limiter: RateLimiter,
    rotator: IdentityRotator,
    policy: RetryPolicy,
    rotate_on_retry: bool,
    stats: Mutex<ExecutorStats>,
}

impl Executor {
    /// Create an executor from a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if the configuration does not
    /// pass [`ExecutorConfig::validate`].
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        config.validate()?;

        let requests_per_minute = NonZeroUsize::new(config.requests_per_minute).ok_or_else(|| {
            ErrorKind::InvalidConfig("requests_per_minute must be greater than 0".into())
        })?;

        Ok(Self {
            limiter: RateLimiter::new(requests_per_minute),
            rotator: IdentityRotator::new(
                config.profiles.clone(),
                config.random_agent,
                config.seed,
            )?,
            policy: config.policy()?,
            rotate_on_retry: config.rotate_on_retry,
            stats: Mutex::new(ExecutorStats::default()),
        })
    }

    /// The shared rate limiter
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The identity rotator
    #[must_use]
    pub const fn rotator(&self) -> &IdentityRotator {
        &self.rotator
    }

    /// The configured retry policy
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// A snapshot of the statistics collected so far
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.stats_mut().clone()
    }

    /// Run `operation` with the configured policy until it succeeds, fails
    /// permanently or runs out of attempts.
    pub async fn execute<F, Fut, O, C>(&self, operation: F, classify: C) -> Execution<O>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = O>,
        C: Classify<O>,
    {
        self.execute_with(operation, classify, &self.policy, &Cancellation::none())
            .await
    }

    /// Like [`Executor::execute`], with a per-call policy and cancellation.
    ///
    /// `cancel` interrupts the rate limit wait, the backoff sleep and the
    /// running attempt alike. An attempt cut short still counts.
    pub async fn execute_with<F, Fut, O, C>(
        &self,
        mut operation: F,
        mut classify: C,
        policy: &RetryPolicy,
        cancel: &Cancellation,
    ) -> Execution<O>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = O>,
        C: Classify<O>,
    {
        let max_attempts = policy.max_attempts();
        let backoff = policy.backoff();

        let mut profile = self.rotator.next_profile();
        let mut delay = Duration::ZERO;
        let mut last: Option<Classification> = None;
        let mut retry_after = None;
        let mut index = 0;

        loop {
            if index > 0 {
                // A rate limited outcome widens the delay right after it by one step
                let widen = u32::from(last == Some(Classification::RetryableRateLimited));
                let retry = u32::try_from(index - 1)
                    .unwrap_or(u32::MAX)
                    .saturating_add(widen);
                let mut next = backoff.delay(retry, self.rotator.jitter(backoff.jitter()));
                if let Some(hint) = retry_after.take() {
                    next = next.max(Duration::min(hint, backoff.max()));
                }
                delay = delay.max(next);

                log::warn!(
                    "Retry {index}/{} after {:.1}s delay",
                    max_attempts - 1,
                    delay.as_secs_f64()
                );
                self.stats_mut().record_retry(delay);
                if cancel.sleep(delay).await.is_err() {
                    return self.cancelled(index, last);
                }

                if self.rotate_on_retry {
                    profile = self.rotator.next_profile();
                }
            }

            if self.limiter.admit_with(cancel).await.is_err() {
                return self.cancelled(index, last);
            }

            log::debug!(
                "Attempt {}/{max_attempts} as {}",
                index + 1,
                profile.name
            );
            let attempt = Attempt {
                index,
                delay,
                profile: Arc::clone(&profile),
            };
            let Ok(outcome) = cancel.run(operation(attempt)).await else {
                return self.cancelled(index + 1, last);
            };

            let classification = classify.classify(&outcome);
            self.stats_mut().record(classification);
            let attempts = index + 1;

            match classification {
                Classification::Success => {
                    return Execution::Success {
                        value: outcome,
                        attempts,
                    };
                }
                Classification::Permanent => {
                    log::debug!("Permanent failure after {attempts} attempt(s)");
                    return Execution::PermanentFailure { outcome, attempts };
                }
                Classification::RetryableTransient | Classification::RetryableRateLimited => {
                    if attempts >= max_attempts {
                        log::warn!(
                            "Giving up after {attempts} attempt(s), last outcome was {classification}"
                        );
                        return Execution::BudgetExhausted {
                            outcome,
                            attempts,
                            last: classification,
                        };
                    }
                    retry_after = classify.retry_after(&outcome);
                    last = Some(classification);
                }
            }

            index += 1;
        }
    }

    fn cancelled<O>(&self, attempts: usize, last: Option<Classification>) -> Execution<O> {
        log::debug!("Cancelled after {attempts} attempt(s)");
        self.stats_mut().record_cancellation();
        Execution::Cancelled { attempts, last }
    }

    fn stats_mut(&self) -> MutexGuard<'_, ExecutorStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
