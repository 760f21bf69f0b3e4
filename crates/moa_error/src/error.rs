//! Top-level error wrapper types.

use crate::{ConfigError, CredentialError, HttpError, ProfileError, RateLimitError};

/// Every error the moa crates can surface.
///
/// # Examples
///
/// ```
/// use moa_error::{MoaError, ConfigError};
///
/// let err: MoaError = ConfigError::new("bad value").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum MoaErrorKind {
    /// HTTP request error
    #[from(HttpError)]
    Http(HttpError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Rate limiter error
    #[from(RateLimitError)]
    RateLimit(RateLimitError),
    /// Credential store error
    #[from(CredentialError)]
    Credential(CredentialError),
    /// Profile configuration error
    #[from(ProfileError)]
    Profile(ProfileError),
}

/// moa error with kind discrimination.
///
/// # Examples
///
/// ```
/// use moa_error::{MoaResult, HttpError, HttpErrorKind};
///
/// fn fetch() -> MoaResult<String> {
///     Err(HttpError::new(HttpErrorKind::Timeout(30_000)))?
/// }
///
/// assert!(fetch().is_err());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("moa Error: {}", _0)]
pub struct MoaError(Box<MoaErrorKind>);

impl MoaError {
    /// Create a new error from a kind.
    pub fn new(kind: MoaErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &MoaErrorKind {
        &self.0
    }
}

impl<T> From<T> for MoaError
where
    T: Into<MoaErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for moa operations.
pub type MoaResult<T> = std::result::Result<T, MoaError>;
