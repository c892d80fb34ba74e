use std::time::Duration;

use tokio::time::Instant;

use crate::Classification;

/// Record and report statistics for an [`crate::Executor`]
#[derive(Debug, Clone, Default)]
pub struct ExecutorStats {
    /// Total number of attempts made
    pub total_attempts: u64,
    /// Number of attempts classified as [`Classification::Success`]
    pub successes: u64,
    /// Number of attempts classified as [`Classification::RetryableTransient`]
    pub transient_failures: u64,
    /// Number of attempts classified as [`Classification::RetryableRateLimited`]
    pub rate_limited: u64,
    /// Number of attempts classified as [`Classification::Permanent`]
    pub permanent_failures: u64,
    /// Number of retries scheduled
    pub retries: u64,
    /// Total time spent sleeping between attempts
    pub backoff_time: Duration,
    /// Number of executions ended by cancellation
    pub cancellations: u64,
    /// Timestamp of the last successful attempt
    pub last_success: Option<Instant>,
    /// Timestamp of the last rate limited attempt
    pub last_rate_limit: Option<Instant>,
}

impl ExecutorStats {
    /// Record the classification of one attempt
    pub fn record(&mut self, classification: Classification) {
        self.total_attempts += 1;

        match classification {
            Classification::Success => {
                self.successes += 1;
                self.last_success = Some(Instant::now());
            }
            Classification::RetryableTransient => self.transient_failures += 1,
            Classification::RetryableRateLimited => {
                self.rate_limited += 1;
                self.last_rate_limit = Some(Instant::now());
            }
            Classification::Permanent => self.permanent_failures += 1,
        }
    }

    /// Record a scheduled retry and its backoff delay
    pub fn record_retry(&mut self, delay: Duration) {
        self.retries += 1;
        self.backoff_time += delay;
    }

    /// Record an execution that was cancelled
    pub fn record_cancellation(&mut self) {
        self.cancellations += 1;
    }

    /// Get the current success rate (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            1.0 // Assume success until proven otherwise
        } else {
            #[allow(clippy::cast_precision_loss)]
            let success_rate = self.successes as f64 / self.total_attempts as f64;
            success_rate
        }
    }

    /// Get the current error rate (0.0 to 1.0)
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        let errors = self.transient_failures + self.rate_limited + self.permanent_failures;
        #[allow(clippy::cast_precision_loss)]
        let error_rate = errors as f64 / self.total_attempts as f64;
        error_rate
    }

    /// Get a human-readable summary of the executor's activity
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} attempts ({:.1}% success), {} retries, {:.1}s backoff, {} rate limited",
            self.total_attempts,
            self.success_rate() * 100.0,
            self.retries,
            self.backoff_time.as_secs_f64(),
            self.rate_limited,
        )
    }
}
