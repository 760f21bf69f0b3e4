//! Profile configuration error types.

/// Kinds of profile configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ProfileErrorKind {
    /// The default profile cannot be removed
    #[display("Cannot delete the default profile")]
    DefaultProfileProtected,
    /// Failed to create the configuration directory
    #[display("Failed to create config directory: {}", _0)]
    DirectoryCreation(String),
    /// Failed to write the profile file
    #[display("Failed to write profile config: {}", _0)]
    Write(String),
    /// Profile config could not be serialized
    #[display("Failed to serialize profile config: {}", _0)]
    Serialization(String),
    /// No home directory to place the default config in
    #[display("Could not determine home directory")]
    NoHomeDirectory,
}

/// Profile configuration error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Profile Error: {} at line {} in {}", kind, line, file)]
pub struct ProfileError {
    /// The kind of error that occurred
    pub kind: ProfileErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ProfileError {
    /// Create a new profile error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ProfileErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
