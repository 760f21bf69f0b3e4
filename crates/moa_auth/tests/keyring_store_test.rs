//! OS keychain store, exercised against keyring's in-process mock backend.

use moa_auth::{
    AuthManager, CREDENTIALS_FILE, CredentialStore, Credentials, KeyringCredentialStore,
    ProfileManager, SERVICE_NAME,
};
use tempfile::TempDir;

fn use_mock_keychain() {
    keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
}

#[test]
fn test_from_profiles_prefers_keychain() -> anyhow::Result<()> {
    use_mock_keychain();
    let dir = TempDir::new()?;
    let profiles = ProfileManager::new(dir.path());

    let auth = AuthManager::from_profiles(&profiles);
    assert!(auth.is_secure_storage_available());

    auth.set_credentials("hubspot", &Credentials::api_key("pat-1"), None)?;
    auth.set_credentials("semrush", &Credentials::api_key("key-2"), None)?;
    assert_eq!(auth.get_token("hubspot", None)?.as_deref(), Some("pat-1"));
    assert_eq!(auth.list_providers(None)?, vec!["hubspot", "semrush"]);
    assert!(!dir.path().join(CREDENTIALS_FILE).exists());

    assert_eq!(auth.clear_profile(None)?, 2);
    assert!(auth.list_providers(None)?.is_empty());
    Ok(())
}

#[test]
fn test_keychain_index_tracks_accounts() -> anyhow::Result<()> {
    use_mock_keychain();
    let store = KeyringCredentialStore::connect(SERVICE_NAME)?;
    assert!(store.is_secure());

    store.set(SERVICE_NAME, "hubspot:default", "a")?;
    store.set(SERVICE_NAME, "meta:work", "b")?;
    store.set(SERVICE_NAME, "hubspot:default", "c")?;
    assert_eq!(
        store.list(SERVICE_NAME)?,
        vec![
            ("hubspot:default".to_string(), "c".to_string()),
            ("meta:work".to_string(), "b".to_string()),
        ]
    );

    assert!(store.delete(SERVICE_NAME, "meta:work")?);
    assert!(!store.delete(SERVICE_NAME, "meta:work")?);
    assert_eq!(store.get(SERVICE_NAME, "meta:work")?, None);
    assert_eq!(store.list(SERVICE_NAME)?.len(), 1);
    Ok(())
}
