//! Construction-time configuration for an [`crate::Executor`].
//!
//! ```toml
//! requests_per_minute = 6
//! max_attempts = 3
//! base_delay = "2s"
//! max_delay = "30s"
//!
//! [[profiles]]
//! name = "firefox"
//! user_agent = "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::{IdentityProfile, default_profiles};
use crate::ratelimit::DEFAULT_REQUESTS_PER_MINUTE;
use crate::retry::RetryPolicy;
use crate::{ErrorKind, Result};

/// Default number of attempts per execution, the first one included
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound for any retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default upper bound of the random term added to each retry delay
pub const DEFAULT_JITTER: Duration = Duration::from_secs(1);

/// Rate, retry and identity settings shared by every execution of an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Maximum number of calls admitted in any trailing 60 seconds
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: usize,

    /// Maximum number of attempts per execution, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry, doubled for every further retry
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound for any retry delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Upper bound of the uniformly distributed term added to each delay
    #[serde(default = "default_jitter", with = "humantime_serde")]
    pub jitter: Duration,

    /// Pick a random profile per attempt instead of always the first one
    #[serde(default = "default_true")]
    pub random_agent: bool,

    /// Draw a new profile before every retry
    #[serde(default = "default_true")]
    pub rotate_on_retry: bool,

    /// Seed for profile selection and jitter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Identity profiles to rotate through
    #[serde(default = "default_profiles")]
    pub profiles: Vec<IdentityProfile>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
            random_agent: true,
            rotate_on_retry: true,
            seed: None,
            profiles: default_profiles(),
        }
    }
}

const fn default_requests_per_minute() -> usize {
    DEFAULT_REQUESTS_PER_MINUTE
}

const fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_base_delay() -> Duration {
    DEFAULT_BASE_DELAY
}

const fn default_max_delay() -> Duration {
    DEFAULT_MAX_DELAY
}

const fn default_jitter() -> Duration {
    DEFAULT_JITTER
}

const fn default_true() -> bool {
    true
}

impl ExecutorConfig {
    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ReadConfig`] if the file cannot be read,
    /// [`ErrorKind::ParseConfig`] if it is not valid TOML for this type and
    /// [`ErrorKind::InvalidConfig`] if a value is out of bounds.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).map_err(|e| ErrorKind::ReadConfig(path.to_path_buf(), e))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ParseConfig`] or [`ErrorKind::InvalidConfig`].
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value against its documented bounds
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(ErrorKind::InvalidConfig(
                "requests_per_minute must be greater than 0".into(),
            ));
        }
        if self.profiles.is_empty() {
            return Err(ErrorKind::InvalidConfig(
                "at least one identity profile is required".into(),
            ));
        }
        self.policy().map(|_| ())
    }

    /// The retry policy described by this configuration
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if the attempt budget or the
    /// delays are out of bounds.
    pub fn policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.max_attempts, self.base_delay, self.max_delay, self.jitter)
    }
}
