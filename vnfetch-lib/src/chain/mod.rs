//! Ordered fallback across alternative retrieval strategies.
//!
//! A [`FallbackChain`] tries its strategies strictly one after another in
//! ascending priority. Each strategy runs through a fresh execution on the
//! shared [`Executor`], so all of them draw from the same rate budget. The
//! first strategy whose value passes the caller's `validate` predicate wins
//! and no later strategy is invoked.

mod outcome;

use std::error::Error as _;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cancel::Cancellation;
use crate::classify::{Fault, HttpClassifier};
use crate::retry::{Attempt, Execution, Executor, RetryPolicy};
use crate::{Classification, Classify};

pub use outcome::{ChainOutcome, StrategyReport, StrategyStatus};

/// Expected reliability of a strategy.
///
/// Documents why a chain is ordered the way it is. The chain itself never
/// looks at it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Reliability {
    /// Usually works
    High,
    /// Works most of the time
    #[default]
    Medium,
    /// Worth a try as a last resort
    Low,
}

/// How trustworthy a strategy's values are
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
    /// Values come straight from the source of record
    #[default]
    Authoritative,
    /// Values are derived or reconstructed, e.g. from performance figures
    Estimated,
}

/// One way of producing a `T`
#[async_trait]
pub trait Strategy<T>: Debug + Send + Sync {
    /// Name used in reports and logs
    fn name(&self) -> &str;

    /// Lower priorities are tried first
    fn priority(&self) -> i32;

    /// Expected reliability, informational only
    fn reliability(&self) -> Reliability {
        Reliability::default()
    }

    /// Provenance attached to the chain outcome when this strategy wins
    fn provenance(&self) -> Provenance {
        Provenance::default()
    }

    /// Retry policy for this strategy, defaults to the executor's
    fn policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// A fresh classifier for one execution of this strategy
    fn classifier(&self) -> Box<dyn Classify<Result<T, Fault>> + Send> {
        Box::new(HttpClassifier::default())
    }

    /// Make one attempt
    async fn attempt(&self, attempt: Attempt) -> Result<T, Fault>;
}

/// Strategies sorted by ascending priority
#[derive(Debug)]
pub struct FallbackChain<T> {
    strategies: Vec<Box<dyn Strategy<T>>>,
}

impl<T> FallbackChain<T> {
    /// Assemble a chain. Strategies with equal priority keep their order.
    #[must_use]
    pub fn new(mut strategies: Vec<Box<dyn Strategy<T>>>) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self { strategies }
    }

    /// Number of strategies
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns `true` if the chain has no strategies
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in the order they are tried
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|s| s.name())
    }

    /// Run the chain until a strategy produces a value accepted by `validate`
    pub async fn run(&self, executor: &Executor, validate: impl Fn(&T) -> bool) -> ChainOutcome<T> {
        self.run_with(executor, validate, &Cancellation::none()).await
    }

    /// Like [`FallbackChain::run`], aborting when `cancel` fires.
    ///
    /// The strategy interrupted by the cancellation is reported as
    /// [`StrategyStatus::Cancelled`], the ones after it as
    /// [`StrategyStatus::NotAttempted`].
    pub async fn run_with(
        &self,
        executor: &Executor,
        validate: impl Fn(&T) -> bool,
        cancel: &Cancellation,
    ) -> ChainOutcome<T> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(self.strategies.len());

        for (position, strategy) in self.strategies.iter().enumerate() {
            let strategy: &dyn Strategy<T> = strategy.as_ref();

            if cancel.is_cancelled() {
                self.mark_not_attempted(position, &mut reports);
                return failed(reports, start, true);
            }

            log::info!(
                "Trying strategy {} (priority {})",
                strategy.name(),
                strategy.priority()
            );
            let policy = strategy.policy();
            let execution = executor
                .execute_with(
                    move |attempt| strategy.attempt(attempt),
                    strategy.classifier(),
                    policy.as_ref().unwrap_or_else(|| executor.policy()),
                    cancel,
                )
                .await;
            let attempts = execution.attempts();

            let status = match execution {
                Execution::Success {
                    value: Ok(value), ..
                } => {
                    if validate(&value) {
                        log::info!(
                            "Strategy {} succeeded after {attempts} attempt(s)",
                            strategy.name()
                        );
                        reports.push(report(strategy, attempts, StrategyStatus::Succeeded));
                        self.mark_not_attempted(position + 1, &mut reports);
                        return ChainOutcome {
                            value: Some(value),
                            winner: Some(strategy.name().to_owned()),
                            provenance: Some(strategy.provenance()),
                            reports,
                            elapsed: start.elapsed(),
                            cancelled: false,
                        };
                    }
                    log::warn!("Strategy {} returned an unusable result", strategy.name());
                    StrategyStatus::Rejected
                }
                Execution::Success {
                    value: Err(fault), ..
                } => StrategyStatus::Failed {
                    classification: Classification::Success,
                    reason: reason(&fault),
                },
                Execution::PermanentFailure { outcome, .. } => StrategyStatus::Failed {
                    classification: Classification::Permanent,
                    reason: outcome_reason(outcome.as_ref().err()),
                },
                Execution::BudgetExhausted { outcome, last, .. } => StrategyStatus::Failed {
                    classification: last,
                    reason: outcome_reason(outcome.as_ref().err()),
                },
                Execution::Cancelled { .. } => {
                    log::warn!("Strategy {} was cancelled", strategy.name());
                    reports.push(report(strategy, attempts, StrategyStatus::Cancelled));
                    self.mark_not_attempted(position + 1, &mut reports);
                    return failed(reports, start, true);
                }
            };

            if let StrategyStatus::Failed { reason, .. } = &status {
                log::warn!("Strategy {} failed: {reason}", strategy.name());
            }
            reports.push(report(strategy, attempts, status));
        }

        log::warn!("All {} strategies failed", self.strategies.len());
        failed(reports, start, false)
    }

    fn mark_not_attempted(&self, from: usize, reports: &mut Vec<StrategyReport>) {
        for strategy in self.strategies.iter().skip(from) {
            reports.push(report(strategy.as_ref(), 0, StrategyStatus::NotAttempted));
        }
    }
}

fn failed<T>(reports: Vec<StrategyReport>, start: Instant, cancelled: bool) -> ChainOutcome<T> {
    ChainOutcome {
        value: None,
        winner: None,
        provenance: None,
        reports,
        elapsed: start.elapsed(),
        cancelled,
    }
}

fn report<T>(strategy: &dyn Strategy<T>, attempts: usize, status: StrategyStatus) -> StrategyReport {
    StrategyReport {
        name: strategy.name().to_owned(),
        priority: strategy.priority(),
        attempts,
        status,
    }
}

fn outcome_reason(fault: Option<&Fault>) -> String {
    fault.map_or_else(|| "outcome classified as a failure".to_owned(), reason)
}

/// The fault and its sources joined by `: `
fn reason(fault: &Fault) -> String {
    let mut reason = fault.to_string();
    let mut source = fault.source();
    while let Some(err) = source {
        reason.push_str(": ");
        reason.push_str(&err.to_string());
        source = err.source();
    }
    reason
}
