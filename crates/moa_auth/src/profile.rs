//! Named configuration profiles persisted as JSON.
//!
//! The file lives at `~/.moa/config.json` by default:
//!
//! ```json
//! {
//!   "activeProfile": "default",
//!   "profiles": {
//!     "default": {},
//!     "agency": {
//!       "defaultProvider": "hubspot",
//!       "providers": { "hubspot": { "portalId": 1234 } }
//!     }
//!   }
//! }
//! ```

use moa_error::{MoaResult, ProfileError, ProfileErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Name of the profile that always exists.
pub const DEFAULT_PROFILE: &str = "default";

/// File name of the profile configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// Provider settings are free-form JSON objects.
pub type ProviderSettings = serde_json::Map<String, serde_json::Value>;

/// Settings for one profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    /// Provider used when a command does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    /// Provider-specific settings keyed by provider name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// The whole profile file.
///
/// Fields missing from the file take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Profile used when none is named
    pub active_profile: String,
    /// All profiles by name
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_profile: DEFAULT_PROFILE.to_string(),
            profiles: BTreeMap::from([(DEFAULT_PROFILE.to_string(), ProfileConfig::default())]),
        }
    }
}

/// Reads and writes the profile file.
///
/// Every mutation is written through to disk immediately.
#[derive(Debug, Clone)]
pub struct ProfileManager {
    path: PathBuf,
    config: AppConfig,
}

impl ProfileManager {
    /// Load `config.json` from `config_dir`; an absent or unreadable file
    /// yields the defaults.
    #[instrument(skip(config_dir), fields(dir = %config_dir.as_ref().display()))]
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let path = config_dir.as_ref().join(CONFIG_FILE);
        let config = Self::load(&path);
        info!(
            active_profile = %config.active_profile,
            profiles = config.profiles.len(),
            "Loaded profile configuration"
        );
        Self { path, config }
    }

    /// Load `~/.moa/config.json`.
    ///
    /// # Errors
    ///
    /// Returns `NoHomeDirectory` if the home directory cannot be determined.
    pub fn open_default() -> MoaResult<Self> {
        let home =
            dirs::home_dir().ok_or_else(|| ProfileError::new(ProfileErrorKind::NoHomeDirectory))?;
        Ok(Self::new(home.join(".moa")))
    }

    fn load(path: &Path) -> AppConfig {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppConfig::default(),
            Err(e) => {
                warn!(error = %e, "Error loading profile config, using defaults");
                return AppConfig::default();
            }
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(error = %e, "Error parsing profile config, using defaults");
            AppConfig::default()
        })
    }

    fn save(&self) -> MoaResult<()> {
        let dir = self.config_dir();
        std::fs::create_dir_all(dir).map_err(|e| {
            ProfileError::new(ProfileErrorKind::DirectoryCreation(format!(
                "{}: {}",
                dir.display(),
                e
            )))
        })?;

        let data = serde_json::to_string_pretty(&self.config)
            .map_err(|e| ProfileError::new(ProfileErrorKind::Serialization(e.to_string())))?;
        std::fs::write(&self.path, data).map_err(|e| {
            ProfileError::new(ProfileErrorKind::Write(format!(
                "{}: {}",
                self.path.display(),
                e
            )))
        })?;

        debug!(path = %self.path.display(), "Saved profile configuration");
        Ok(())
    }

    fn resolve<'a>(&'a self, profile: Option<&'a str>) -> &'a str {
        match profile {
            Some(name) if !name.is_empty() => name,
            _ => &self.config.active_profile,
        }
    }

    /// Directory holding the profile file (and the plaintext credential store).
    pub fn config_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// The loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Name of the active profile.
    pub fn active_profile(&self) -> &str {
        &self.config.active_profile
    }

    /// Make `name` the active profile, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a profile error if the file cannot be written.
    pub fn set_active_profile(&mut self, name: &str) -> MoaResult<()> {
        self.config.profiles.entry(name.to_string()).or_default();
        self.config.active_profile = name.to_string();
        self.save()
    }

    /// Settings for a profile (the active one when `None`); unknown profiles are empty.
    pub fn profile(&self, name: Option<&str>) -> ProfileConfig {
        self.config
            .profiles
            .get(self.resolve(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Settings for one provider within a profile; empty when unset.
    pub fn provider_config(&self, provider: &str, profile: Option<&str>) -> ProviderSettings {
        self.profile(profile)
            .providers
            .remove(provider)
            .unwrap_or_default()
    }

    /// Replace one provider's settings within a profile, creating the profile if needed.
    ///
    /// # Errors
    ///
    /// Returns a profile error if the file cannot be written.
    pub fn set_provider_config(
        &mut self,
        provider: &str,
        settings: ProviderSettings,
        profile: Option<&str>,
    ) -> MoaResult<()> {
        let name = self.resolve(profile).to_string();
        self.config
            .profiles
            .entry(name)
            .or_default()
            .providers
            .insert(provider.to_string(), settings);
        self.save()
    }

    /// Edit a profile in place, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a profile error if the file cannot be written.
    pub fn update_profile(
        &mut self,
        name: &str,
        update: impl FnOnce(&mut ProfileConfig),
    ) -> MoaResult<()> {
        update(self.config.profiles.entry(name.to_string()).or_default());
        self.save()
    }

    /// Profile names, sorted.
    pub fn list_profiles(&self) -> Vec<String> {
        self.config.profiles.keys().cloned().collect()
    }

    /// Delete a profile, returning whether it existed.
    ///
    /// Deleting the active profile makes `default` active again.
    ///
    /// # Errors
    ///
    /// Returns `DefaultProfileProtected` for `default`, or a profile error if
    /// the file cannot be written.
    pub fn delete_profile(&mut self, name: &str) -> MoaResult<bool> {
        if name == DEFAULT_PROFILE {
            return Err(ProfileError::new(ProfileErrorKind::DefaultProfileProtected).into());
        }
        if self.config.profiles.remove(name).is_none() {
            return Ok(false);
        }
        if self.config.active_profile == name {
            self.config.active_profile = DEFAULT_PROFILE.to_string();
        }
        self.save()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"activeProfile":"agency"}"#).unwrap();
        assert_eq!(config.active_profile, "agency");
        assert!(config.profiles.contains_key(DEFAULT_PROFILE));
    }

    #[test]
    fn test_empty_profile_serializes_as_empty_object() {
        let json = serde_json::to_string(&ProfileConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
