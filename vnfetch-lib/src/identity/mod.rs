//! Identity rotation.
//!
//! An [`IdentityProfile`] is the set of client-identifying headers presented
//! with one attempt. The [`IdentityRotator`] picks a profile per attempt from
//! a fixed list, uniformly at random unless randomization is disabled.

mod profiles;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, header};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, Result};

pub use profiles::default_profiles;

/// Client-identifying request metadata presented with an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityProfile {
    /// Human readable label, used in logs
    pub name: String,

    /// Value of the `User-Agent` header
    #[serde(with = "crate::headers::header_value")]
    pub user_agent: HeaderValue,

    /// Additional headers sent along with the user agent
    #[serde(default)]
    #[serde(deserialize_with = "crate::headers::deserialize_headers")]
    #[serde(serialize_with = "crate::headers::serialize_headers")]
    pub headers: HeaderMap,
}

impl IdentityProfile {
    /// Create a profile that only sets a user agent
    #[must_use]
    pub fn new(name: impl Into<String>, user_agent: HeaderValue) -> Self {
        Self {
            name: name.into(),
            user_agent,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header to the profile
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Write the profile onto `headers`, replacing values already present
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        headers.insert(header::USER_AGENT, self.user_agent.clone());
    }
}

/// Picks an [`IdentityProfile`] for every attempt.
///
/// The rotator also owns the random source for backoff jitter, so an
/// executor has a single seedable RNG.
#[derive(Debug)]
pub struct IdentityRotator {
    profiles: Vec<Arc<IdentityProfile>>,
    randomize: bool,
    rng: Mutex<StdRng>,
}

impl IdentityRotator {
    /// Create a rotator over `profiles`.
    ///
    /// With `randomize` disabled, the first profile is always returned.
    /// A `seed` makes the sequence of draws reproducible.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if `profiles` is empty.
    pub fn new(profiles: Vec<IdentityProfile>, randomize: bool, seed: Option<u64>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(ErrorKind::InvalidConfig(
                "at least one identity profile is required".into(),
            ));
        }

        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Ok(Self {
            profiles: profiles.into_iter().map(Arc::new).collect(),
            randomize,
            rng: Mutex::new(rng),
        })
    }

    /// Draw the profile for the next attempt
    #[must_use]
    pub fn next_profile(&self) -> Arc<IdentityProfile> {
        let index = if self.randomize && self.profiles.len() > 1 {
            self.rng().random_range(0..self.profiles.len())
        } else {
            0
        };
        Arc::clone(&self.profiles[index])
    }

    /// A uniformly distributed duration in `[0, max)`
    #[must_use]
    pub fn jitter(&self, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        max.mul_f64(self.rng().random_range(0.0..1.0))
    }

    /// The profiles this rotator draws from
    #[must_use]
    pub fn profiles(&self) -> &[Arc<IdentityProfile>] {
        &self.profiles
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
