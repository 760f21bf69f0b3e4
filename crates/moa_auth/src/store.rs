//! Backing stores for secrets, keyed by service and account.

use moa_error::{CredentialError, CredentialErrorKind, MoaResult};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// File name of the plaintext store inside the moa config directory.
pub const CREDENTIALS_FILE: &str = ".credentials";

/// Uniform secret storage contract.
///
/// Secrets are opaque strings addressed by `(service, account)`.
pub trait CredentialStore: Send + Sync + Debug {
    /// The secret for an account, if stored.
    fn get(&self, service: &str, account: &str) -> MoaResult<Option<String>>;

    /// Store or replace a secret.
    fn set(&self, service: &str, account: &str, secret: &str) -> MoaResult<()>;

    /// Remove a secret, returning whether one existed.
    fn delete(&self, service: &str, account: &str) -> MoaResult<bool>;

    /// Every `(account, secret)` pair stored under `service`.
    fn list(&self, service: &str) -> MoaResult<Vec<(String, String)>>;

    /// True when secrets never reach disk in plaintext.
    fn is_secure(&self) -> bool;
}

fn entry_key(service: &str, account: &str) -> String {
    format!("{}:{}", service, account)
}

fn accounts_under(entries: &BTreeMap<String, String>, service: &str) -> Vec<(String, String)> {
    let prefix = format!("{}:", service);
    entries
        .iter()
        .filter_map(|(key, secret)| {
            key.strip_prefix(&prefix)
                .map(|account| (account.to_string(), secret.clone()))
        })
        .collect()
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, service: &str, account: &str) -> MoaResult<Option<String>> {
        Ok(self.lock().get(&entry_key(service, account)).cloned())
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> MoaResult<()> {
        self.lock()
            .insert(entry_key(service, account), secret.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> MoaResult<bool> {
        Ok(self.lock().remove(&entry_key(service, account)).is_some())
    }

    fn list(&self, service: &str) -> MoaResult<Vec<(String, String)>> {
        Ok(accounts_under(&self.lock(), service))
    }

    fn is_secure(&self) -> bool {
        true
    }
}

/// Plaintext JSON file store.
///
/// The whole file is read once at construction and rewritten after every
/// mutation. A missing or unreadable file starts the store empty. A mutation
/// whose write fails leaves the in-memory entries untouched.
///
/// # File Format
///
/// ```json
/// {
///   "moa-cli:hubspot:default": "{\"token\":\"...\",\"tokenType\":\"api_key\"}"
/// }
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading any existing entries.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = Self::load(&path);
        info!(entries = entries.len(), "Opened plaintext credential store");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Open `.credentials` inside a config directory.
    pub fn in_dir(config_dir: impl AsRef<Path>) -> Self {
        Self::new(config_dir.as_ref().join(CREDENTIALS_FILE))
    }

    /// Open `~/.moa/.credentials`.
    ///
    /// # Errors
    ///
    /// Returns `NoHomeDirectory` if the home directory cannot be determined.
    pub fn open_default() -> MoaResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CredentialError::new(CredentialErrorKind::NoHomeDirectory))?;
        Ok(Self::in_dir(home.join(".moa")))
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "Credential file unreadable, starting empty");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(error = %e, "Credential file corrupt, starting empty");
            BTreeMap::new()
        })
    }

    /// Write all entries, replacing the file atomically.
    fn save(&self, entries: &BTreeMap<String, String>) -> MoaResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                CredentialError::new(CredentialErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    dir.display(),
                    e
                )))
            })?;
        }

        let data = serde_json::to_string_pretty(entries).map_err(|e| {
            CredentialError::new(CredentialErrorKind::Serialization(e.to_string()))
        })?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, data).map_err(|e| {
            CredentialError::new(CredentialErrorKind::Write(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;
        restrict_permissions(&temp_path);
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            CredentialError::new(CredentialErrorKind::Write(format!(
                "{}: {}",
                self.path.display(),
                e
            )))
        })?;

        debug!(entries = entries.len(), "Saved credential file");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(error = %e, "Could not restrict credential file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

impl CredentialStore for FileCredentialStore {
    fn get(&self, service: &str, account: &str) -> MoaResult<Option<String>> {
        Ok(self.lock().get(&entry_key(service, account)).cloned())
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> MoaResult<()> {
        let mut entries = self.lock();
        let mut updated = entries.clone();
        updated.insert(entry_key(service, account), secret.to_string());
        self.save(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> MoaResult<bool> {
        let mut entries = self.lock();
        let key = entry_key(service, account);
        if !entries.contains_key(&key) {
            return Ok(false);
        }
        let mut updated = entries.clone();
        updated.remove(&key);
        self.save(&updated)?;
        *entries = updated;
        Ok(true)
    }

    fn list(&self, service: &str) -> MoaResult<Vec<(String, String)>> {
        Ok(accounts_under(&self.lock(), service))
    }

    fn is_secure(&self) -> bool {
        false
    }
}
