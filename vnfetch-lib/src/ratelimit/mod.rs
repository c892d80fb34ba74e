//! Sliding-window admission control.
//!
//! A [`RateLimiter`] bounds the number of calls admitted in any trailing
//! window (60 seconds unless configured otherwise). Every admitted call
//! records its instant in a [`Window`]; instants age out of the window on
//! their own and are never removed otherwise.
//!
//! All admission checks go through one FIFO-fair [`tokio::sync::Mutex`], so
//! concurrent callers on a shared limiter are admitted in call order and can
//! never push the window past its capacity. Only the admission is
//! serialized: whatever the caller does after [`RateLimiter::admit`] returns
//! runs concurrently.

mod window;

use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cancel::{Cancellation, Cancelled};

pub use window::Window;

/// Length of the trailing window the request quota applies to
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Default quota, 10 requests per minute.
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 10;

/// Extra time slept past the computed wait so the oldest entry has safely
/// left the window when we re-check.
pub(crate) const ADMISSION_EPSILON: Duration = Duration::from_millis(100);

/// Sliding-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<Window<Instant>>,
    period: Duration,
}

impl RateLimiter {
    /// Create a limiter admitting `requests_per_minute` calls per [`RATE_WINDOW`]
    #[must_use]
    pub fn new(requests_per_minute: NonZeroUsize) -> Self {
        Self::with_period(requests_per_minute, RATE_WINDOW)
    }

    /// Create a limiter admitting `capacity` calls per `period`
    #[must_use]
    pub fn with_period(capacity: NonZeroUsize, period: Duration) -> Self {
        Self {
            window: Mutex::new(Window::new(capacity.get())),
            period,
        }
    }

    /// Maximum number of calls admitted per period
    pub async fn capacity(&self) -> usize {
        self.window.lock().await.capacity()
    }

    /// Length of the sliding window
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Number of admissions still inside the trailing window
    pub async fn in_window(&self) -> usize {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        window.prune(|at| now.duration_since(*at) >= self.period);
        window.len()
    }

    /// Wait until one more call fits into the window, then record it.
    ///
    /// This always admits eventually.
    pub async fn admit(&self) {
        // `Cancellation::none` never fires, so this cannot fail
        let _ = self.admit_with(&Cancellation::none()).await;
    }

    /// Like [`RateLimiter::admit`], but gives up when `cancel` fires.
    ///
    /// Nothing is recorded for a cancelled admission.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if `cancel` fired while waiting for the lock or
    /// for the window to free up.
    pub async fn admit_with(&self, cancel: &Cancellation) -> Result<(), Cancelled> {
        let mut window = cancel.run(self.window.lock()).await?;

        loop {
            let now = Instant::now();
            window.prune(|at| now.duration_since(*at) >= self.period);

            if !window.is_full() {
                window.push(now);
                log::trace!(
                    "Admitted request ({}/{} in window)",
                    window.len(),
                    window.capacity()
                );
                return Ok(());
            }

            // Hold the lock while waiting so later callers queue up behind us
            let wait = window.front().map_or(Duration::ZERO, |oldest| {
                self.period.saturating_sub(now.duration_since(*oldest))
            });
            log::info!(
                "Rate limit reached ({}/{}s). Waiting {:.1} seconds...",
                window.capacity(),
                self.period.as_secs(),
                wait.as_secs_f64()
            );
            cancel.sleep(wait + ADMISSION_EPSILON).await?;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_REQUESTS_PER_MINUTE).unwrap_or(NonZeroUsize::MIN))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn limiter(requests_per_minute: usize) -> RateLimiter {
        RateLimiter::new(NonZeroUsize::new(requests_per_minute).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_capacity_immediately() {
        let limiter = limiter(3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.admit().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_call_waits_for_window() {
        let limiter = limiter(3);
        let start = Instant::now();

        for _ in 0..4 {
            limiter.admit().await;
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(57), "admitted after {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(63), "admitted after {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_quota_in_any_window() {
        let capacity = 5;
        let limiter = limiter(capacity);
        let mut admitted = Vec::new();

        for _ in 0..(capacity * 3 + 1) {
            limiter.admit().await;
            admitted.push(Instant::now());
        }

        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|at| at.duration_since(*start) < RATE_WINDOW)
                .count();
            assert!(in_window <= capacity, "{in_window} admissions within one window");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_age_out() {
        let limiter = limiter(2);
        limiter.admit().await;
        limiter.admit().await;

        tokio::time::sleep(RATE_WINDOW).await;

        assert_eq!(limiter.in_window().await, 0);
        let start = Instant::now();
        limiter.admit().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_the_quota() {
        let limiter = Arc::new(limiter(2));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.admit().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut elapsed = Vec::new();
        for handle in handles {
            elapsed.push(handle.await.unwrap());
        }
        elapsed.sort();

        assert_eq!(elapsed[0], Duration::ZERO);
        assert_eq!(elapsed[1], Duration::ZERO);
        assert!(elapsed[2] >= RATE_WINDOW);
        assert!(elapsed[3] >= RATE_WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_follows_call_order() {
        let limiter = Arc::new(limiter(2));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let start = Instant::now();

        let mut handles = Vec::new();
        for i in 0..6 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.admit().await;
                order.lock().unwrap().push((i, start.elapsed()));
            }));
            // Let the task queue up on the limiter before the next one is spawned
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let order = order.lock().unwrap();
        let indices: Vec<_> = order.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, [0, 1, 2, 3, 4, 5]);
        // The last four callers queued behind a full window
        assert!(order[2..].iter().all(|(_, elapsed)| *elapsed >= RATE_WINDOW));
        assert!(order[4].1 >= RATE_WINDOW * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_admission_records_nothing() {
        let limiter = limiter(1);
        limiter.admit().await;

        let cancel = Cancellation::timeout(Duration::from_secs(10));
        assert_eq!(limiter.admit_with(&cancel).await, Err(Cancelled));
        assert_eq!(limiter.in_window().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_period() {
        let limiter =
            RateLimiter::with_period(NonZeroUsize::new(1).unwrap(), Duration::from_secs(1));
        let start = Instant::now();

        limiter.admit().await;
        limiter.admit().await;

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
