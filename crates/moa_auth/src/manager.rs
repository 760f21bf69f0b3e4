//! Per-provider, per-profile credential management.

use crate::{
    CredentialStore, Credentials, FileCredentialStore, KeyringCredentialStore, ProfileManager,
};
use moa_error::{CredentialError, CredentialErrorKind, MoaResult};
use moa_http::TokenSource;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// Service name every moa credential is stored under.
pub const SERVICE_NAME: &str = "moa-cli";

/// Stores and retrieves provider credentials for named profiles.
///
/// Accounts are `"{provider}:{profile}"` under [`SERVICE_NAME`]. Calls that
/// take `profile: None` use the profile that was active when the manager was
/// built.
///
/// # Example
///
/// ```
/// use moa_auth::{AuthManager, Credentials, MemoryCredentialStore};
/// use std::sync::Arc;
///
/// let auth = AuthManager::new(Arc::new(MemoryCredentialStore::new()), "default");
/// auth.set_credentials("hubspot", &Credentials::api_key("pat-1"), None).unwrap();
/// assert_eq!(auth.get_token("hubspot", None).unwrap().as_deref(), Some("pat-1"));
/// ```
#[derive(Debug)]
pub struct AuthManager {
    store: Arc<dyn CredentialStore>,
    active_profile: String,
    warned_plaintext: AtomicBool,
}

impl AuthManager {
    /// Manage credentials in `store`, defaulting to `active_profile`.
    pub fn new(store: Arc<dyn CredentialStore>, active_profile: impl Into<String>) -> Self {
        Self {
            store,
            active_profile: active_profile.into(),
            warned_plaintext: AtomicBool::new(false),
        }
    }

    /// The OS keychain if it answers, otherwise the file store in the
    /// profile manager's directory. Defaults to its active profile.
    ///
    /// The keychain is contacted once, here; the choice holds for the manager's
    /// lifetime.
    pub fn from_profiles(profiles: &ProfileManager) -> Self {
        let store = select_store(
            KeyringCredentialStore::connect(SERVICE_NAME),
            profiles.config_dir(),
        );
        Self::new(store, profiles.active_profile())
    }

    /// The plaintext file store in the profile manager's directory, skipping
    /// the keychain.
    pub fn plaintext(profiles: &ProfileManager) -> Self {
        Self::new(
            Arc::new(FileCredentialStore::in_dir(profiles.config_dir())),
            profiles.active_profile(),
        )
    }

    /// Keychain or `~/.moa/.credentials`, defaulting to the active profile in
    /// `~/.moa/config.json`.
    ///
    /// # Errors
    ///
    /// Returns `NoHomeDirectory` if the home directory cannot be determined.
    pub fn open_default() -> MoaResult<Self> {
        Ok(Self::from_profiles(&ProfileManager::open_default()?))
    }

    fn account(&self, provider: &str, profile: Option<&str>) -> String {
        format!("{}:{}", provider, self.profile_name(profile))
    }

    fn profile_name<'a>(&'a self, profile: Option<&'a str>) -> &'a str {
        match profile {
            Some(name) if !name.is_empty() => name,
            _ => &self.active_profile,
        }
    }

    /// Store credentials for a provider.
    ///
    /// # Errors
    ///
    /// Returns a credential error if serialization or the store write fails.
    #[instrument(skip(self, credentials), fields(token_type = %credentials.token_type()))]
    pub fn set_credentials(
        &self,
        provider: &str,
        credentials: &Credentials,
        profile: Option<&str>,
    ) -> MoaResult<()> {
        if !self.store.is_secure() && !self.warned_plaintext.swap(true, Ordering::SeqCst) {
            warn!("Secure credential storage unavailable, storing credentials in plaintext file");
        }

        let data = serde_json::to_string(credentials).map_err(|e| {
            CredentialError::new(CredentialErrorKind::Serialization(e.to_string()))
        })?;
        self.store
            .set(SERVICE_NAME, &self.account(provider, profile), &data)
    }

    /// Stored credentials, or `None` if absent or unparseable.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports.
    pub fn get_credentials(
        &self,
        provider: &str,
        profile: Option<&str>,
    ) -> MoaResult<Option<Credentials>> {
        let account = self.account(provider, profile);
        let Some(data) = self.store.get(SERVICE_NAME, &account)? else {
            return Ok(None);
        };
        match serde_json::from_str(&data) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                debug!(account, error = %e, "Ignoring unparseable credentials");
                Ok(None)
            }
        }
    }

    /// The stored token if present and not expired.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports.
    pub fn get_token(&self, provider: &str, profile: Option<&str>) -> MoaResult<Option<String>> {
        Ok(self
            .get_credentials(provider, profile)?
            .filter(|credentials| !credentials.is_expired())
            .map(|credentials| credentials.token().clone()))
    }

    /// True if stored credentials carry an expiry that has (nearly) passed.
    ///
    /// Missing credentials and credentials without an expiry are not expired.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports.
    pub fn is_token_expired(&self, provider: &str, profile: Option<&str>) -> MoaResult<bool> {
        Ok(self
            .get_credentials(provider, profile)?
            .is_some_and(|credentials| credentials.is_expired()))
    }

    /// True if parseable credentials are stored.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports.
    pub fn has_credentials(&self, provider: &str, profile: Option<&str>) -> MoaResult<bool> {
        Ok(self.get_credentials(provider, profile)?.is_some())
    }

    /// Remove stored credentials, returning whether any existed.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports.
    pub fn delete_credentials(&self, provider: &str, profile: Option<&str>) -> MoaResult<bool> {
        self.store
            .delete(SERVICE_NAME, &self.account(provider, profile))
    }

    /// Providers with credentials stored for a profile, sorted.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports.
    pub fn list_providers(&self, profile: Option<&str>) -> MoaResult<Vec<String>> {
        let suffix = format!(":{}", self.profile_name(profile));
        let mut providers: Vec<String> = self
            .store
            .list(SERVICE_NAME)?
            .into_iter()
            .filter_map(|(account, _)| account.strip_suffix(&suffix).map(str::to_string))
            .collect();
        providers.sort();
        Ok(providers)
    }

    /// Remove every credential stored for a profile, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports.
    #[instrument(skip(self))]
    pub fn clear_profile(&self, profile: Option<&str>) -> MoaResult<usize> {
        let mut removed = 0;
        for provider in self.list_providers(profile)? {
            if self.delete_credentials(&provider, profile)? {
                removed += 1;
            }
        }
        debug!(removed, "Cleared profile credentials");
        Ok(removed)
    }

    /// True when the backing store keeps secrets off disk.
    pub fn is_secure_storage_available(&self) -> bool {
        self.store.is_secure()
    }
}

/// The keychain when it answered, else the plaintext file store.
fn select_store(
    keychain: MoaResult<KeyringCredentialStore>,
    config_dir: &Path,
) -> Arc<dyn CredentialStore> {
    match keychain {
        Ok(store) => {
            info!("Storing credentials in the OS keychain");
            Arc::new(store)
        }
        Err(e) => {
            debug!(error = %e, "OS keychain unavailable, using credential file");
            Arc::new(FileCredentialStore::in_dir(config_dir))
        }
    }
}

impl TokenSource for AuthManager {
    fn token(&self, provider: &str, profile: &str) -> MoaResult<Option<String>> {
        self.get_token(provider, Some(profile))
    }
}
