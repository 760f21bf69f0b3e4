//! Error types for the moa outbound request layer.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! HTTP failures additionally carry how many attempts were made, so callers
//! can tell a first-try 404 from a 503 that survived the whole retry budget.
//!
//! # Examples
//!
//! ```
//! use moa_error::{HttpError, HttpErrorKind, MoaResult};
//!
//! fn fetch_data() -> MoaResult<String> {
//!     Err(HttpError::new(HttpErrorKind::Network("Connection refused".into())))?
//! }
//!
//! match fetch_data() {
//!     Ok(data) => println!("Got: {}", data),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod credential;
mod error;
mod http;
mod profile;
mod rate_limit;

pub use config::ConfigError;
pub use credential::{CredentialError, CredentialErrorKind};
pub use error::{MoaError, MoaErrorKind, MoaResult};
pub use http::{HttpError, HttpErrorKind, RetryableError, StatusFailure};
pub use profile::{ProfileError, ProfileErrorKind};
pub use rate_limit::{RateLimitError, RateLimitErrorKind, RateLimitResult};
