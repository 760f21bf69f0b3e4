//! OS keychain store backed by the `keyring` crate.
//!
//! Keychains cannot enumerate accounts, so each service keeps its account
//! names in one extra entry, [`INDEX_ACCOUNT`], holding a JSON array.

use crate::CredentialStore;
use keyring::Entry;
use moa_error::{CredentialError, CredentialErrorKind, MoaResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, warn};

/// Account holding the list of accounts stored under a service.
pub const INDEX_ACCOUNT: &str = "__accounts__";

const AVAILABILITY_ACCOUNT: &str = "__availability__";

fn keyring_error(e: keyring::Error) -> CredentialError {
    CredentialError::new(CredentialErrorKind::Keyring(e.to_string()))
}

/// Secrets held by the platform keychain (macOS Keychain, Windows Credential
/// Manager, Secret Service on Linux).
///
/// Entries are opened once and reused for the lifetime of the store.
pub struct KeyringCredentialStore {
    entries: Mutex<HashMap<(String, String), Arc<Entry>>>,
    index: Mutex<()>,
}

impl std::fmt::Debug for KeyringCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringCredentialStore")
            .field("open_entries", &self.lock_entries().len())
            .finish_non_exhaustive()
    }
}

impl KeyringCredentialStore {
    /// Connect to the keychain and check that it answers for `service`.
    ///
    /// # Errors
    ///
    /// Returns `Keyring` if no keychain is reachable (for example a headless
    /// Linux session without a Secret Service daemon).
    #[instrument]
    pub fn connect(service: &str) -> MoaResult<Self> {
        let store = Self {
            entries: Mutex::new(HashMap::new()),
            index: Mutex::new(()),
        };
        let entry = store.entry(service, AVAILABILITY_ACCOUNT)?;
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => {
                debug!("Keychain available");
                Ok(store)
            }
            Err(e) => Err(keyring_error(e).into()),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<(String, String), Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, service: &str, account: &str) -> MoaResult<Arc<Entry>> {
        let key = (service.to_string(), account.to_string());
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get(&key) {
            return Ok(Arc::clone(entry));
        }
        let entry = Arc::new(Entry::new(service, account).map_err(keyring_error)?);
        entries.insert(key, Arc::clone(&entry));
        Ok(entry)
    }

    fn read(&self, service: &str, account: &str) -> MoaResult<Option<String>> {
        match self.entry(service, account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keyring_error(e).into()),
        }
    }

    fn accounts(&self, service: &str) -> MoaResult<BTreeSet<String>> {
        let Some(data) = self.read(service, INDEX_ACCOUNT)? else {
            return Ok(BTreeSet::new());
        };
        Ok(serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(service, error = %e, "Keychain account index corrupt, starting empty");
            BTreeSet::new()
        }))
    }

    fn update_accounts(
        &self,
        service: &str,
        change: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> MoaResult<()> {
        let _guard = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        let mut accounts = self.accounts(service)?;
        if !change(&mut accounts) {
            return Ok(());
        }
        let data = serde_json::to_string(&accounts).map_err(|e| {
            CredentialError::new(CredentialErrorKind::Serialization(e.to_string()))
        })?;
        self.entry(service, INDEX_ACCOUNT)?
            .set_password(&data)
            .map_err(keyring_error)?;
        Ok(())
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, service: &str, account: &str) -> MoaResult<Option<String>> {
        self.read(service, account)
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> MoaResult<()> {
        self.entry(service, account)?
            .set_password(secret)
            .map_err(keyring_error)?;
        self.update_accounts(service, |accounts| accounts.insert(account.to_string()))
    }

    fn delete(&self, service: &str, account: &str) -> MoaResult<bool> {
        let existed = match self.entry(service, account)?.delete_credential() {
            Ok(()) => true,
            Err(keyring::Error::NoEntry) => false,
            Err(e) => return Err(keyring_error(e).into()),
        };
        self.update_accounts(service, |accounts| accounts.remove(account))?;
        Ok(existed)
    }

    fn list(&self, service: &str) -> MoaResult<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for account in self.accounts(service)? {
            if let Some(secret) = self.read(service, &account)? {
                pairs.push((account, secret));
            }
        }
        Ok(pairs)
    }

    fn is_secure(&self) -> bool {
        true
    }
}
