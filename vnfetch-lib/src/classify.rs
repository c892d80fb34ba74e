//! The default HTTP failure taxonomy.
//!
//! [`Fault`] is the failure half of a raw attempt outcome and
//! [`HttpClassifier`] maps `Result<T, Fault>` onto a [`Classification`]:
//!
//! - timeouts, connection failures, `408` and `5xx` are transient
//! - `429` is rate limited
//! - `403` is transient for a bounded streak, then permanent
//! - everything else is permanent
//!
//! Endpoints with other needs implement [`Classify`] themselves.

use std::io;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::Classification;
use crate::Classify;

/// Number of consecutive `403 Forbidden` responses retried before giving up
pub const DEFAULT_FORBIDDEN_RETRIES: usize = 3;

/// Why a single attempt did not produce a value
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Fault {
    /// The request could not be sent or the response could not be read
    #[error("Network error")]
    Transport(#[from] reqwest::Error),
    /// The server answered with a non-success status code
    #[error("Rejected status code: {status}")]
    Status {
        /// Status code of the response
        status: StatusCode,
        /// Parsed `Retry-After` header, if the server sent one
        retry_after: Option<Duration>,
    },
    /// The body arrived but could not be decoded
    #[error("Cannot decode response body: {0}")]
    Decode(String),
    /// Any other failure reported by an operation
    #[error("{0}")]
    Other(String),
}

impl Fault {
    /// Build a [`Fault::Status`] from a response, keeping its `Retry-After` hint
    #[must_use]
    pub fn from_response(response: &reqwest::Response) -> Self {
        Self::Status {
            status: response.status(),
            retry_after: crate::headers::retry_after(response.headers()),
        }
    }

    /// The HTTP status code behind this fault, if any
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Classification of this fault on its own, without any escalation policy
    #[must_use]
    pub fn classification(&self) -> Classification {
        match self {
            Self::Transport(e) => e.classification(),
            Self::Status { status, .. } => status.classification(),
            Self::Decode(_) => Classification::RetryableTransient,
            Self::Other(_) => Classification::Permanent,
        }
    }
}

/// Maps a failure type onto the four retry categories
trait ClassifyExt {
    fn classification(&self) -> Classification;
}

impl ClassifyExt for StatusCode {
    fn classification(&self) -> Classification {
        let status = *self;
        if status.is_success() {
            Classification::Success
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Classification::RetryableRateLimited
        } else if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::FORBIDDEN
        {
            Classification::RetryableTransient
        } else {
            Classification::Permanent
        }
    }
}

impl ClassifyExt for reqwest::Error {
    fn classification(&self) -> Classification {
        if self.is_timeout() || self.is_connect() {
            Classification::RetryableTransient
        } else if self.is_builder() || self.is_redirect() {
            Classification::Permanent
        } else if self.is_body() || self.is_decode() {
            // The response started arriving, so the endpoint itself is fine
            Classification::RetryableTransient
        } else if let Some(status) = self.status() {
            status.classification()
        } else if self.is_request() {
            request_error_classification(self)
        } else {
            Classification::Permanent
        }
    }
}

/// Look through the source chain of a failed request for the hyper or I/O
/// error that caused it.
fn request_error_classification(error: &reqwest::Error) -> Classification {
    // `hyper::Error(IncompleteMessage)` means the connection was cut while
    // the response was being sent, `Canceled` a graceful close on the server
    // side. Both are worth another attempt.
    if let Some(hyper_error) = get_source_error_type::<hyper::Error>(error) {
        if hyper_error.is_incomplete_message() || hyper_error.is_canceled() {
            return Classification::RetryableTransient;
        }
        if let Some(io_error) = get_source_error_type::<io::Error>(hyper_error) {
            return io_classification(io_error);
        }
    }
    match get_source_error_type::<io::Error>(error) {
        Some(io_error) => io_classification(io_error),
        None => Classification::RetryableTransient,
    }
}

fn io_classification(error: &io::Error) -> Classification {
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::TimedOut => Classification::RetryableTransient,
        _ => Classification::Permanent,
    }
}

/// Downcasts the given err source into T.
fn get_source_error_type<T: std::error::Error + 'static>(
    err: &dyn std::error::Error,
) -> Option<&T> {
    let mut source = err.source();

    while let Some(err) = source {
        if let Some(typed) = err.downcast_ref::<T>() {
            return Some(typed);
        }

        source = err.source();
    }
    None
}

/// Default classifier for `Result<T, Fault>` outcomes.
///
/// A `403 Forbidden` is often a temporary anti-bot block, so the classifier
/// treats the first `forbidden_retries` consecutive ones as transient and
/// escalates to [`Classification::Permanent`] after that. Any other outcome
/// resets the streak.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    forbidden_retries: usize,
    forbidden_streak: usize,
}

impl HttpClassifier {
    /// Create a classifier retrying up to `forbidden_retries` consecutive `403`s
    #[must_use]
    pub const fn new(forbidden_retries: usize) -> Self {
        Self {
            forbidden_retries,
            forbidden_streak: 0,
        }
    }

    /// Number of consecutive `403` responses seen so far
    #[must_use]
    pub const fn forbidden_streak(&self) -> usize {
        self.forbidden_streak
    }
}

impl Default for HttpClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_FORBIDDEN_RETRIES)
    }
}

impl<T> Classify<Result<T, Fault>> for HttpClassifier {
    fn classify(&mut self, outcome: &Result<T, Fault>) -> Classification {
        let fault = match outcome {
            Ok(_) => {
                self.forbidden_streak = 0;
                return Classification::Success;
            }
            Err(fault) => fault,
        };

        if fault.status() != Some(StatusCode::FORBIDDEN) {
            self.forbidden_streak = 0;
            return fault.classification();
        }

        self.forbidden_streak += 1;
        if self.forbidden_streak > self.forbidden_retries {
            log::debug!(
                "Escalating after {} consecutive 403 responses",
                self.forbidden_streak
            );
            Classification::Permanent
        } else {
            Classification::RetryableTransient
        }
    }

    fn retry_after(&self, outcome: &Result<T, Fault>) -> Option<Duration> {
        match outcome {
            Err(Fault::Status { retry_after, .. }) => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn status(code: u16) -> Result<(), Fault> {
        Err(Fault::Status {
            status: StatusCode::from_u16(code).unwrap(),
            retry_after: None,
        })
    }

    #[rstest]
    #[case(408, Classification::RetryableTransient)]
    #[case(429, Classification::RetryableRateLimited)]
    #[case(500, Classification::RetryableTransient)]
    #[case(502, Classification::RetryableTransient)]
    #[case(503, Classification::RetryableTransient)]
    #[case(504, Classification::RetryableTransient)]
    #[case(400, Classification::Permanent)]
    #[case(401, Classification::Permanent)]
    #[case(404, Classification::Permanent)]
    #[case(410, Classification::Permanent)]
    #[case(304, Classification::Permanent)]
    fn test_status_classification(#[case] code: u16, #[case] expected: Classification) {
        let mut classifier = HttpClassifier::default();
        assert_eq!(classifier.classify(&status(code)), expected);
    }

    #[rstest]
    #[case(Fault::Decode("expected value at line 1".into()), Classification::RetryableTransient)]
    #[case(Fault::Other("symbol not found".into()), Classification::Permanent)]
    fn test_fault_classification(#[case] fault: Fault, #[case] expected: Classification) {
        let mut classifier = HttpClassifier::default();
        assert_eq!(classifier.classify(&Err::<(), _>(fault)), expected);
    }

    #[test]
    fn test_ok_is_success() {
        let mut classifier = HttpClassifier::default();
        assert_eq!(
            classifier.classify(&Ok::<_, Fault>(Vec::<u8>::new())),
            Classification::Success
        );
    }

    #[test]
    fn test_forbidden_escalates_after_streak() {
        let mut classifier = HttpClassifier::new(2);
        assert_eq!(classifier.classify(&status(403)), Classification::RetryableTransient);
        assert_eq!(classifier.classify(&status(403)), Classification::RetryableTransient);
        assert_eq!(classifier.classify(&status(403)), Classification::Permanent);
        assert_eq!(classifier.forbidden_streak(), 3);
    }

    #[test]
    fn test_forbidden_streak_resets() {
        let mut classifier = HttpClassifier::new(1);
        assert_eq!(classifier.classify(&status(403)), Classification::RetryableTransient);
        assert_eq!(classifier.classify(&status(503)), Classification::RetryableTransient);
        assert_eq!(classifier.forbidden_streak(), 0);
        assert_eq!(classifier.classify(&status(403)), Classification::RetryableTransient);
        assert_eq!(classifier.classify(&status(403)), Classification::Permanent);
    }

    #[test]
    fn test_forbidden_without_retries_is_permanent() {
        let mut classifier = HttpClassifier::new(0);
        assert_eq!(classifier.classify(&status(403)), Classification::Permanent);
    }

    #[test]
    fn test_retry_after_hint() {
        let classifier = HttpClassifier::default();
        let throttled: Result<(), Fault> = Err(Fault::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: Some(Duration::from_secs(12)),
        });
        assert_eq!(
            classifier.retry_after(&throttled),
            Some(Duration::from_secs(12))
        );
        assert_eq!(classifier.retry_after(&status(503)), None);
    }

    #[test]
    fn test_builder_error_is_permanent() {
        let error = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        assert_eq!(
            Fault::from(error).classification(),
            Classification::Permanent
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Nothing listens on port 1 in the test environment
        let error = reqwest::get("http://127.0.0.1:1/").await.unwrap_err();
        assert_eq!(
            Fault::from(error).classification(),
            Classification::RetryableTransient
        );
    }

    #[test]
    fn test_io_classification() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(io_classification(&reset), Classification::RetryableTransient);
        assert_eq!(io_classification(&denied), Classification::Permanent);
    }
}
