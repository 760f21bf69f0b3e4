//! Configuration structures for rate limiting and request retries.
//!
//! This module provides TOML-based configuration. The configuration system
//! supports:
//! - Bundled defaults (include_str! from moa.toml)
//! - User overrides (./moa.toml or ~/.config/moa/moa.toml)
//! - Automatic merging with user values taking precedence

use crate::Provider;
use moa_error::{ConfigError, MoaError, MoaResult, RateLimitError, RateLimitErrorKind};
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, instrument};

/// Settings for a single token-bucket admission gate.
///
/// Any field missing from a TOML table falls back to the global default, so an
/// override only needs the values it changes.
///
/// # Example
///
/// ```toml
/// [rate_limits.providers.hubspot]
/// max_concurrent = 10
/// min_time_ms = 100
/// reservoir = 100
/// reservoir_refresh_amount = 100
/// reservoir_refresh_interval_ms = 10_000
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_builder::Builder,
)]
#[serde(default)]
#[builder(default)]
pub struct LimiterConfig {
    /// Maximum number of tasks executing at once
    pub max_concurrent: u32,

    /// Minimum spacing between successive dispatches, in milliseconds
    pub min_time_ms: u64,

    /// Burst capacity; the reservoir never holds more than this
    pub reservoir: u32,

    /// Tokens added to the reservoir on every refresh
    pub reservoir_refresh_amount: u32,

    /// Refresh period in milliseconds (0 disables refilling)
    pub reservoir_refresh_interval_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::global_default()
    }
}

impl LimiterConfig {
    /// The documented fallback: 5 concurrent, 100ms spacing, 10 requests per second.
    pub const fn global_default() -> Self {
        Self {
            max_concurrent: 5,
            min_time_ms: 100,
            reservoir: 10,
            reservoir_refresh_amount: 10,
            reservoir_refresh_interval_ms: 1_000,
        }
    }

    /// Creates a new limiter config builder.
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::default()
    }

    /// Minimum spacing between dispatches, or `None` when unconstrained.
    pub fn min_time(&self) -> Option<Duration> {
        (self.min_time_ms > 0).then(|| Duration::from_millis(self.min_time_ms))
    }

    /// Refresh period, or `None` when the reservoir never refills.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.reservoir_refresh_interval_ms > 0 && self.reservoir_refresh_amount > 0)
            .then(|| Duration::from_millis(self.reservoir_refresh_interval_ms))
    }

    /// Reject configurations that could never admit a request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `max_concurrent` is zero, or if the reservoir
    /// starts empty and is never refilled.
    #[track_caller]
    pub fn validate(&self, limiter: &str) -> Result<(), RateLimitError> {
        if self.max_concurrent == 0 {
            return Err(RateLimitError::new(RateLimitErrorKind::InvalidConfig {
                limiter: limiter.to_string(),
                reason: "max_concurrent must be at least 1".to_string(),
            }));
        }
        if self.reservoir == 0 && self.refresh_interval().is_none() {
            return Err(RateLimitError::new(RateLimitErrorKind::InvalidConfig {
                limiter: limiter.to_string(),
                reason: "reservoir is empty and never refilled".to_string(),
            }));
        }
        Ok(())
    }
}

/// Limiter settings for the global gate and every provider gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Shared gate every request passes through
    #[serde(default = "LimiterConfig::global_default")]
    pub global: LimiterConfig,

    /// Settings for providers without their own entry
    #[serde(default = "LimiterConfig::global_default")]
    pub default: LimiterConfig,

    /// Map of provider name to limiter settings
    #[serde(default)]
    pub providers: HashMap<String, LimiterConfig>,
}

impl Default for RateLimitConfig {
    /// The built-in provider table.
    fn default() -> Self {
        Self {
            global: LimiterConfig::global_default(),
            default: LimiterConfig::global_default(),
            providers: Provider::iter()
                .map(|p| (p.to_string(), p.default_limits()))
                .collect(),
        }
    }
}

impl RateLimitConfig {
    /// Settings for a provider, falling back to `default` for unlisted names.
    pub fn limits_for(&self, provider: &str) -> LimiterConfig {
        self.providers
            .get(provider)
            .copied()
            .unwrap_or(self.default)
    }

    /// Validate the global, fallback, and every provider entry.
    ///
    /// # Errors
    ///
    /// Returns the first `InvalidConfig` encountered.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        self.global.validate("global")?;
        self.default.validate("default")?;
        for (name, limits) in &self.providers {
            limits.validate(name)?;
        }
        Ok(())
    }
}

/// Defaults applied to every request executor built from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpDefaults {
    /// Per-attempt wall-clock timeout in milliseconds
    pub timeout_ms: u64,
    /// Total attempts a call may make
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
}

impl Default for HttpDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Top-level moa configuration.
///
/// Loads configuration from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from moa.toml)
/// 2. User override (./moa.toml or ~/.config/moa/moa.toml)
///
/// # Example
///
/// ```no_run
/// use moa_rate_limit::MoaConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MoaConfig::load()?;
/// let hubspot = config.rate_limits.limits_for("hubspot");
/// println!("HubSpot reservoir: {}", hubspot.reservoir);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MoaConfig {
    /// Limiter settings
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Request executor defaults
    #[serde(default)]
    pub http: HttpDefaults,
}

impl MoaConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> MoaResult<Self> {
        debug!("Loading configuration from file");

        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                MoaError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                MoaError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Load configuration with precedence: user override > bundled default.
    ///
    /// Configuration sources in order of precedence (later sources override earlier):
    /// 1. Bundled defaults (moa.toml shipped with the library)
    /// 2. User config in home directory (~/.config/moa/moa.toml)
    /// 3. User config in current directory (./moa.toml)
    ///
    /// User config files are optional and are skipped if not found.
    #[instrument]
    pub fn load() -> MoaResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../../../moa.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/moa/moa.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("moa").required(false));

        builder
            .build()
            .map_err(|e| {
                MoaError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                MoaError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_configs_are_valid() {
        RateLimitConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let limits = LimiterConfig {
            max_concurrent: 0,
            ..LimiterConfig::global_default()
        };
        let err = limits.validate("broken").unwrap_err();
        assert!(matches!(
            err.kind(),
            RateLimitErrorKind::InvalidConfig { limiter, .. } if limiter == "broken"
        ));
    }

    #[test]
    fn test_empty_reservoir_without_refill_rejected() {
        let limits = LimiterConfig {
            reservoir: 0,
            reservoir_refresh_interval_ms: 0,
            ..LimiterConfig::global_default()
        };
        assert!(limits.validate("dry").is_err());

        // Starts empty but refills: allowed.
        let limits = LimiterConfig {
            reservoir: 0,
            ..LimiterConfig::global_default()
        };
        assert!(limits.validate("slow-start").is_ok());
    }

    #[test]
    fn test_unlisted_provider_uses_fallback() {
        let config = RateLimitConfig::default();
        assert_eq!(config.limits_for("tiktok"), LimiterConfig::global_default());
    }

    #[test]
    fn test_builder_fills_missing_fields_from_default() {
        let limits = LimiterConfig::builder()
            .reservoir(5u32)
            .min_time_ms(0u64)
            .build()
            .unwrap();
        assert_eq!(limits.reservoir, 5);
        assert_eq!(limits.min_time(), None);
        assert_eq!(limits.max_concurrent, 5);
    }
}
