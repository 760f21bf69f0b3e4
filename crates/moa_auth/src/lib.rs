//! Credential and profile management for moa.
//!
//! - [`CredentialStore`] is the storage capability, with the OS keychain
//!   ([`KeyringCredentialStore`]), a plaintext [`FileCredentialStore`]
//!   fallback, and an in-process [`MemoryCredentialStore`]
//! - [`AuthManager`] maps providers and profiles onto store accounts and
//!   supplies tokens to [`RequestExecutor`](moa_http::RequestExecutor)
//! - [`ProfileManager`] persists named profiles and their provider settings

mod credentials;
mod keychain;
mod manager;
mod profile;
mod store;

pub use credentials::{Credentials, CredentialsBuilder, CredentialsBuilderError, EXPIRY_BUFFER_MS, TokenType};
pub use keychain::{INDEX_ACCOUNT, KeyringCredentialStore};
pub use manager::{AuthManager, SERVICE_NAME};
pub use profile::{
    AppConfig, CONFIG_FILE, DEFAULT_PROFILE, ProfileConfig, ProfileManager, ProviderSettings,
};
pub use store::{CREDENTIALS_FILE, CredentialStore, FileCredentialStore, MemoryCredentialStore};
