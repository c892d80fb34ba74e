//! `vnfetch` is a library for talking to rate limited, bot-wary HTTP
//! endpoints: it admits requests through a sliding-window rate limiter,
//! retries them with exponential backoff and rotating browser identities,
//! and falls back across alternative retrieval strategies.
//!
//! Retry a single request:
//!
//! ```no_run
//! use vnfetch_lib::{ClientBuilder, ExecutorConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .config(ExecutorConfig {
//!           requests_per_minute: 6,
//!           ..ExecutorConfig::default()
//!       })
//!       .build()
//!       .client()?;
//!
//!   let request = reqwest::Request::new(
//!       reqwest::Method::GET,
//!       "https://example.com/api/funds".parse().unwrap(),
//!   );
//!   let response = client.send(request).await.into_result()?;
//!   println!("{}", response.status());
//!   Ok(())
//! }
//! ```
//!
//! Run any async operation through the executor with your own classifier:
//!
//! ```
//! use vnfetch_lib::{Classification, Executor, ExecutorConfig, Result, from_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let executor = Executor::new(&ExecutorConfig::default())?;
//!   let execution = executor
//!       .execute(
//!           |attempt| async move { attempt.index * 10 },
//!           from_fn(|_: &usize| Classification::Success),
//!       )
//!       .await;
//!   assert_eq!(execution.into_value(), Some(0));
//!   Ok(())
//! }
//! ```

mod backoff;
mod cancel;
mod classify;
mod client;
mod config;
mod headers;
mod identity;
mod retry;
mod stats;
mod types;

pub mod chain;
pub mod ratelimit;

pub use backoff::Backoff;
pub use cancel::{Cancellation, Cancelled};
pub use chain::{
    ChainOutcome, FallbackChain, Provenance, Reliability, Strategy, StrategyReport,
    StrategyStatus,
};
pub use classify::{DEFAULT_FORBIDDEN_RETRIES, Fault, HttpClassifier};
pub use client::{Client, ClientBuilder, DEFAULT_TIMEOUT, Transport};
pub use config::{
    DEFAULT_BASE_DELAY, DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, ExecutorConfig,
};
pub use identity::{IdentityProfile, IdentityRotator, default_profiles};
pub use ratelimit::RateLimiter;
pub use retry::{Attempt, Execution, Executor, RetryPolicy};
pub use stats::ExecutorStats;
pub use types::*;

/// Attribute for implementing [`Strategy`] and [`Transport`]
pub use async_trait::async_trait;
/// Re-exported for use with [`Cancellation::token`]
pub use tokio_util::sync::CancellationToken;
