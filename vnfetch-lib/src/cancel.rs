//! Caller-supplied cancellation for the two suspension points of a request:
//! waiting for rate-limit admission and sleeping between retries.
//!
//! A [`Cancellation`] combines an optional [`CancellationToken`] with an
//! optional deadline. Whichever fires first wins. The default value never
//! fires.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Returned when a wait was cut short by a [`Cancellation`]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Operation was cancelled")]
pub struct Cancelled;

/// External signal that aborts waiting and in-flight attempts
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A cancellation that never fires
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Cancel when `token` is cancelled
    #[must_use]
    pub fn token(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// Cancel once `deadline` has passed
    #[must_use]
    pub fn deadline(deadline: Instant) -> Self {
        Self {
            token: None,
            deadline: Some(deadline),
        }
    }

    /// Cancel after `timeout` from now
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::deadline(Instant::now() + timeout)
    }

    /// Add a deadline, keeping the earlier one if a deadline is already set
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Add a token, replacing any token that was set before
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Returns `true` if the token was cancelled or the deadline has passed
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Resolves once the cancellation fires. Pending forever for [`Cancellation::none`].
    pub async fn cancelled(&self) {
        match (&self.token, self.deadline) {
            (None, None) => std::future::pending().await,
            (Some(token), None) => token.cancelled().await,
            (None, Some(deadline)) => tokio::time::sleep_until(deadline).await,
            (Some(token), Some(deadline)) => {
                tokio::select! {
                    () = token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
        }
    }

    /// Drive `future` to completion unless the cancellation fires first.
    ///
    /// An already fired cancellation wins over a ready future.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the cancellation fired before `future` finished.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        tokio::select! {
            biased;
            () = self.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }

    /// Sleep for `duration` unless the cancellation fires first.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the sleep was interrupted.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.run(tokio::time::sleep(duration)).await
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self::token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_none_never_fires() {
        let cancel = Cancellation::none();
        assert!(!cancel.is_cancelled());
        assert_eq!(cancel.sleep(Duration::from_secs(3600)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let start = Instant::now();
        let cancel = Cancellation::timeout(Duration::from_secs(5));

        assert_eq!(cancel.sleep(Duration::from_secs(60)).await, Err(Cancelled));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_interrupts_sleep() {
        let token = CancellationToken::new();
        let cancel = Cancellation::token(token.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            token.cancel();
        });

        let start = Instant::now();
        assert_eq!(cancel.sleep(Duration::from_secs(60)).await, Err(Cancelled));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fired_cancellation_beats_ready_future() {
        let token = CancellationToken::new();
        token.cancel();
        let cancel = Cancellation::token(token);

        assert_eq!(cancel.run(async { 42 }).await, Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_and_deadline_combined() {
        let token = CancellationToken::new();
        let cancel = Cancellation::timeout(Duration::from_secs(30)).with_token(token.clone());
        assert!(!cancel.is_cancelled());

        token.cancel();
        assert!(cancel.is_cancelled());
        assert_eq!(cancel.sleep(Duration::from_secs(60)).await, Err(Cancelled));
    }

    #[test]
    fn test_from_token() {
        let token = CancellationToken::new();
        let cancel = Cancellation::from(token.clone());
        assert!(!cancel.is_cancelled());
        token.cancel();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let early = now + Duration::from_secs(1);
        let late = now + Duration::from_secs(10);

        let cancel = Cancellation::deadline(early).with_deadline(late);
        assert_eq!(cancel.deadline, Some(early));
    }
}
