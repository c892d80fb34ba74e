use std::fmt::{self, Display};
use std::time::Duration;

use serde::Serialize;

use crate::Classification;

use super::Provenance;

/// What happened to one strategy during a chain run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StrategyStatus {
    /// Produced a value that passed validation
    Succeeded,
    /// The executor gave up on the strategy
    Failed {
        /// Classification of the last attempt
        classification: Classification,
        /// Human readable failure reason
        reason: String,
    },
    /// Produced a value that failed validation
    Rejected,
    /// Never invoked, because an earlier strategy won or the run was cancelled
    NotAttempted,
    /// Interrupted by cancellation
    Cancelled,
}

impl StrategyStatus {
    /// Returns `true` for [`StrategyStatus::Failed`] and [`StrategyStatus::Rejected`]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Rejected)
    }
}

impl Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed {
                classification,
                reason,
            } => write!(f, "failed ({classification}): {reason}"),
            Self::Rejected => write!(f, "rejected by validation"),
            Self::NotAttempted => write!(f, "not attempted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-strategy entry of a [`ChainOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyReport {
    /// Strategy name
    pub name: String,
    /// Strategy priority
    pub priority: i32,
    /// Attempts the executor made for this strategy
    pub attempts: usize,
    /// How the strategy ended
    pub status: StrategyStatus,
}

impl Display for StrategyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} attempt(s)): {}",
            self.name, self.attempts, self.status
        )
    }
}

/// Result of one [`super::FallbackChain`] run.
///
/// `reports` holds exactly one entry per strategy, in the order the chain
/// tries them.
#[derive(Debug)]
pub struct ChainOutcome<T> {
    /// The winning value, if any strategy succeeded
    pub value: Option<T>,
    /// Name of the winning strategy
    pub winner: Option<String>,
    /// Provenance of the winning value
    pub provenance: Option<Provenance>,
    /// One report per strategy
    pub reports: Vec<StrategyReport>,
    /// Wall time of the whole run
    pub elapsed: Duration,
    /// Whether the run was aborted by cancellation
    pub cancelled: bool,
}

impl<T> ChainOutcome<T> {
    /// Returns `true` if a strategy produced a usable value
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.value.is_some()
    }

    /// Returns `true` if the run was aborted by cancellation
    #[must_use]
    pub const fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Attempt counts keyed by strategy name, in chain order
    #[must_use]
    pub fn attempts_per_strategy(&self) -> Vec<(&str, usize)> {
        self.reports
            .iter()
            .map(|r| (r.name.as_str(), r.attempts))
            .collect()
    }

    /// Reports of strategies that failed or were rejected, in chain order
    pub fn failures(&self) -> impl Iterator<Item = &StrategyReport> {
        self.reports.iter().filter(|r| r.status.is_failure())
    }

    /// Sum of attempts over all strategies
    #[must_use]
    pub fn total_attempts(&self) -> usize {
        self.reports.iter().map(|r| r.attempts).sum()
    }

    /// The winning value
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}
