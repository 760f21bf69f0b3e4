//! Credential store error types.

/// Kinds of credential store errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum CredentialErrorKind {
    /// Failed to create the directory holding the store
    #[display("Failed to create credential directory: {}", _0)]
    DirectoryCreation(String),
    /// Failed to read the store
    #[display("Failed to read credentials: {}", _0)]
    Read(String),
    /// Failed to write the store
    #[display("Failed to write credentials: {}", _0)]
    Write(String),
    /// Credentials could not be serialized
    #[display("Failed to serialize credentials: {}", _0)]
    Serialization(String),
    /// The OS keychain refused or failed an operation
    #[display("Keychain error: {}", _0)]
    Keyring(String),
    /// No home directory to place the default store in
    #[display("Could not determine home directory")]
    NoHomeDirectory,
}

/// Credential store error with location tracking.
///
/// # Examples
///
/// ```
/// use moa_error::{CredentialError, CredentialErrorKind};
///
/// let err = CredentialError::new(CredentialErrorKind::Write("disk full".into()));
/// assert!(format!("{}", err).contains("disk full"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Credential Error: {} at line {} in {}", kind, line, file)]
pub struct CredentialError {
    /// The kind of error that occurred
    pub kind: CredentialErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CredentialError {
    /// Create a new credential error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CredentialErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
