use std::path::PathBuf;

use thiserror::Error;

use crate::{Classification, Fault};

/// Possible errors when configuring or driving `vnfetch_lib`
///
/// Expected request failures are not errors: they are reported through
/// [`crate::Execution`] and [`crate::ChainOutcome`]. This type shows up when
/// construction fails or when an execution is converted with
/// [`crate::Execution::into_result`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A configuration value violates its documented bounds
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// The configuration file could not be read
    #[error("Failed to read configuration file `{}`: {}", .0.display(), .1)]
    ReadConfig(PathBuf, #[source] std::io::Error),
    /// The configuration file is not valid TOML for [`crate::ExecutorConfig`]
    #[error("Failed to parse configuration file")]
    ParseConfig(#[from] toml::de::Error),
    /// The underlying `reqwest` client could not be built
    #[error("Failed to build the HTTP client")]
    BuildClient(#[source] reqwest::Error),
    /// A header value could not be parsed.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    /// The classifier reported a permanent failure
    #[error("Request failed permanently after {attempts} attempt(s)")]
    PermanentFailure {
        /// Number of attempts made, including the failing one
        attempts: usize,
        /// The raw failure of the last attempt, when it carried one
        #[source]
        fault: Option<Fault>,
    },
    /// Every attempt was classified as retryable and the budget ran out
    #[error("Retry budget exhausted after {attempts} attempt(s), last outcome was {last}")]
    BudgetExhausted {
        /// Number of attempts made
        attempts: usize,
        /// Classification of the last attempt
        last: Classification,
        /// The raw failure of the last attempt, when it carried one
        #[source]
        fault: Option<Fault>,
    },
    /// The operation was cancelled before it could finish
    #[error("Operation cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Number of attempts started before cancellation
        attempts: usize,
    },
    /// A single attempt failed
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl ErrorKind {
    /// Number of attempts behind this error, if it came out of an execution
    #[must_use]
    pub const fn attempts(&self) -> Option<usize> {
        match self {
            Self::PermanentFailure { attempts, .. }
            | Self::BudgetExhausted { attempts, .. }
            | Self::Cancelled { attempts } => Some(*attempts),
            _ => None,
        }
    }

    /// The raw transport failure behind this error, if any
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::PermanentFailure { fault, .. } | Self::BudgetExhausted { fault, .. } => {
                fault.as_ref()
            }
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<crate::Cancelled> for ErrorKind {
    fn from(_: crate::Cancelled) -> Self {
        Self::Cancelled { attempts: 0 }
    }
}
