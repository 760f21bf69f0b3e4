//! File-backed credential store persistence.

use moa_auth::{CREDENTIALS_FILE, CredentialStore, FileCredentialStore};
use tempfile::TempDir;

#[test]
fn test_entries_survive_reopen() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested").join(CREDENTIALS_FILE);

    let store = FileCredentialStore::new(&path);
    store.set("moa-cli", "hubspot:default", "secret-1")?;
    store.set("moa-cli", "meta:work", "secret-2")?;
    assert!(path.exists());

    let reopened = FileCredentialStore::new(&path);
    assert_eq!(
        reopened.get("moa-cli", "hubspot:default")?.as_deref(),
        Some("secret-1")
    );
    assert_eq!(reopened.list("moa-cli")?.len(), 2);
    assert!(!reopened.is_secure());
    Ok(())
}

#[test]
fn test_file_is_flat_json_map() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = FileCredentialStore::in_dir(dir.path());
    store.set("moa-cli", "semrush:default", "k")?;

    let raw = std::fs::read_to_string(store.path())?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    assert_eq!(parsed, serde_json::json!({"moa-cli:semrush:default": "k"}));
    Ok(())
}

#[test]
fn test_delete_persists() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = FileCredentialStore::in_dir(dir.path());
    store.set("moa-cli", "meta:default", "k")?;

    assert!(store.delete("moa-cli", "meta:default")?);
    assert!(!store.delete("moa-cli", "meta:default")?);

    let reopened = FileCredentialStore::in_dir(dir.path());
    assert_eq!(reopened.get("moa-cli", "meta:default")?, None);
    Ok(())
}

#[test]
fn test_corrupt_file_starts_empty() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join(CREDENTIALS_FILE);
    std::fs::write(&path, "{ not json")?;

    let store = FileCredentialStore::new(&path);
    assert!(store.list("moa-cli")?.is_empty());

    // The next write replaces the corrupt file.
    store.set("moa-cli", "hubspot:default", "fresh")?;
    let reopened = FileCredentialStore::new(&path);
    assert_eq!(
        reopened.get("moa-cli", "hubspot:default")?.as_deref(),
        Some("fresh")
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_file_is_owner_only() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new()?;
    let store = FileCredentialStore::in_dir(dir.path());
    store.set("moa-cli", "hubspot:default", "k")?;

    let mode = std::fs::metadata(store.path())?.permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    Ok(())
}

#[test]
fn test_failed_write_leaves_entries_unchanged() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = FileCredentialStore::in_dir(dir.path());
    store.set("moa-cli", "hubspot:default", "kept")?;

    // A directory squatting on the temp file makes every save fail.
    let blocker = dir.path().join(format!("{}.tmp", CREDENTIALS_FILE));
    std::fs::create_dir(&blocker)?;

    assert!(store.set("moa-cli", "meta:default", "unsaved").is_err());
    assert_eq!(store.get("moa-cli", "meta:default")?, None);

    assert!(store.delete("moa-cli", "hubspot:default").is_err());
    assert_eq!(
        store.get("moa-cli", "hubspot:default")?.as_deref(),
        Some("kept")
    );
    assert_eq!(store.list("moa-cli")?.len(), 1);
    Ok(())
}
