//! HTTP failure taxonomy and retry classification.

/// A response that arrived with a non-success status.
///
/// Keeps the pieces of the response later stages still need: the status for
/// classification, the raw `Retry-After` header for delay selection, and the
/// body so callers can surface the provider's own message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
#[display("HTTP {}: {}", status, body)]
pub struct StatusFailure {
    /// Response status code
    pub status: u16,
    /// Raw `Retry-After` header value, if the server sent one
    pub retry_after: Option<String>,
    /// Response body as text (may be empty)
    pub body: String,
}

impl StatusFailure {
    /// Create a status failure record.
    pub fn new(status: u16, retry_after: Option<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after,
            body: body.into(),
        }
    }
}

/// Specific HTTP failure conditions.
///
/// # Examples
///
/// ```
/// use moa_error::HttpErrorKind;
///
/// let kind = HttpErrorKind::from_status(503, None, "unavailable");
/// assert!(matches!(kind, HttpErrorKind::Server(_)));
/// assert!(kind.is_retryable());
///
/// let kind = HttpErrorKind::from_status(404, None, "missing");
/// assert!(!kind.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum HttpErrorKind {
    /// No response reached the client (connection refused, DNS, reset, ...)
    #[display("Network failure: {}", _0)]
    Network(String),
    /// The attempt exceeded its wall-clock budget
    #[display("Request timed out after {}ms", _0)]
    Timeout(u64),
    /// Server answered 429 Too Many Requests
    #[display("Rate limited by server: {}", _0)]
    RateLimited(StatusFailure),
    /// Server answered with a 5xx status
    #[display("Server error: {}", _0)]
    Server(StatusFailure),
    /// Any other non-success status
    #[display("Client error: {}", _0)]
    Client(StatusFailure),
    /// Response body could not be decoded
    #[display("Failed to decode response body: {}", _0)]
    Decode(String),
    /// Request could not be built (bad URL, bad header value)
    #[display("Invalid request: {}", _0)]
    InvalidRequest(String),
    /// The limiter refused to admit the request
    #[display("Request admission failed: {}", _0)]
    Admission(String),
    /// Every allowed attempt failed with a retryable error
    #[display("Retry budget exhausted after {} attempts: {}", attempts, last)]
    RetryBudgetExhausted {
        /// Number of attempts made
        attempts: u32,
        /// The failure of the final attempt
        last: Box<HttpErrorKind>,
    },
}

impl HttpErrorKind {
    /// Classify a non-success status.
    ///
    /// 429 is `RateLimited`, anything at or above 500 is `Server`, everything
    /// else is `Client`.
    pub fn from_status(status: u16, retry_after: Option<String>, body: impl Into<String>) -> Self {
        let failure = StatusFailure::new(status, retry_after, body);
        match status {
            429 => HttpErrorKind::RateLimited(failure),
            s if s >= 500 => HttpErrorKind::Server(failure),
            _ => HttpErrorKind::Client(failure),
        }
    }

    /// Check if this failure should be retried.
    ///
    /// Only failures where no response arrived, 429s, and 5xx responses are
    /// retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HttpErrorKind::Network(_)
                | HttpErrorKind::Timeout(_)
                | HttpErrorKind::RateLimited(_)
                | HttpErrorKind::Server(_)
        )
    }

    /// True when no response was received at all.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, HttpErrorKind::Network(_) | HttpErrorKind::Timeout(_))
    }

    /// The failing response, if one was received.
    pub fn status_failure(&self) -> Option<&StatusFailure> {
        match self {
            HttpErrorKind::RateLimited(f) | HttpErrorKind::Server(f) | HttpErrorKind::Client(f) => {
                Some(f)
            }
            HttpErrorKind::RetryBudgetExhausted { last, .. } => last.status_failure(),
            _ => None,
        }
    }

    /// Status code of the failing response, if one was received.
    pub fn status(&self) -> Option<u16> {
        self.status_failure().map(|f| f.status)
    }

    /// Raw `Retry-After` header of the failing response.
    pub fn retry_after(&self) -> Option<&str> {
        self.status_failure().and_then(|f| f.retry_after.as_deref())
    }

    /// The underlying failure, looking through `RetryBudgetExhausted`.
    pub fn root(&self) -> &HttpErrorKind {
        match self {
            HttpErrorKind::RetryBudgetExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// HTTP error with attempt count and source location.
///
/// # Examples
///
/// ```
/// use moa_error::{HttpError, HttpErrorKind};
///
/// let err = HttpError::new(HttpErrorKind::Network("connection refused".into()))
///     .with_attempts(3);
/// assert_eq!(err.attempts, 3);
/// assert!(format!("{}", err).contains("connection refused"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display(
    "HTTP Error: {} (attempts: {}) at line {} in {}",
    kind,
    attempts,
    line,
    file
)]
pub struct HttpError {
    /// The kind of error that occurred
    pub kind: HttpErrorKind,
    /// How many attempts were made before this error surfaced
    pub attempts: u32,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl HttpError {
    /// Create a new HttpError at the current location.
    #[track_caller]
    pub fn new(kind: HttpErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            attempts: 0,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Attach the number of attempts made.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> &HttpErrorKind {
        &self.kind
    }
}

impl From<HttpErrorKind> for HttpError {
    #[track_caller]
    fn from(kind: HttpErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Trait for errors that support retry logic.
///
/// The request executor consults this to decide whether a failed attempt
/// should be retried and whether the server supplied its own wait hint.
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    ///
    /// Transient failures (network loss, timeouts, 429, 5xx) return true.
    /// Permanent failures (other 4xx, decode errors) return false.
    fn is_retryable(&self) -> bool;

    /// Raw `Retry-After` header value carried by the failure, if any.
    fn retry_after(&self) -> Option<&str> {
        None
    }
}

impl RetryableError for HttpErrorKind {
    fn is_retryable(&self) -> bool {
        HttpErrorKind::is_retryable(self)
    }

    fn retry_after(&self) -> Option<&str> {
        HttpErrorKind::retry_after(self)
    }
}

impl RetryableError for HttpError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn retry_after(&self) -> Option<&str> {
        self.kind.retry_after()
    }
}
