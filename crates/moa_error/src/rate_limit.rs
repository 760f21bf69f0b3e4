//! Rate limiter error types.

/// Error kinds for rate limiting operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum RateLimitErrorKind {
    /// Limiter configuration can never admit a request.
    #[display("Invalid limiter configuration for '{}': {}", limiter, reason)]
    InvalidConfig {
        /// Name of the limiter being built
        limiter: String,
        /// What is wrong with it
        reason: String,
    },
    /// The limiter's admission gate was shut down.
    #[display("Limiter '{}' is closed", _0)]
    Closed(String),
    /// The reservoir is empty and configured never to refill.
    #[display("Limiter '{}' has no reservoir left and never refills", _0)]
    Depleted(String),
}

/// Rate limiting error with location tracking.
///
/// # Examples
///
/// ```
/// use moa_error::{RateLimitError, RateLimitErrorKind};
///
/// let err = RateLimitError::new(RateLimitErrorKind::Closed("global".into()));
/// assert!(format!("{}", err).contains("global"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Rate Limit Error: {} at line {} in {}", kind, line, file)]
pub struct RateLimitError {
    kind: RateLimitErrorKind,
    line: u32,
    file: &'static str,
}

impl RateLimitError {
    /// Create a new rate limiting error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RateLimitErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RateLimitErrorKind {
        &self.kind
    }
}

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = std::result::Result<T, RateLimitError>;
