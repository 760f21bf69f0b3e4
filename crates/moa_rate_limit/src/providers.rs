//! Built-in limits for the SaaS providers moa talks to.
//!
//! These values follow each provider's published API quotas and are what the
//! registry uses when no configuration override is present.

use crate::LimiterConfig;

/// Providers with documented rate limits.
///
/// Parsing is case-sensitive and uses the lowercase identifier, so
/// `"hubspot".parse::<Provider>()` succeeds and `"HubSpot"` does not.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    /// HubSpot CRM: 100 requests per 10 seconds
    Hubspot,
    /// Semrush: 5 requests per second
    Semrush,
    /// Meta Marketing API: 10 requests per second
    Meta,
}

impl Provider {
    /// Documented limits for this provider.
    pub const fn default_limits(&self) -> LimiterConfig {
        match self {
            Provider::Hubspot => LimiterConfig {
                max_concurrent: 10,
                min_time_ms: 100,
                reservoir: 100,
                reservoir_refresh_amount: 100,
                reservoir_refresh_interval_ms: 10_000,
            },
            Provider::Semrush => LimiterConfig {
                max_concurrent: 5,
                min_time_ms: 200,
                reservoir: 5,
                reservoir_refresh_amount: 5,
                reservoir_refresh_interval_ms: 1_000,
            },
            Provider::Meta => LimiterConfig {
                max_concurrent: 5,
                min_time_ms: 100,
                reservoir: 10,
                reservoir_refresh_amount: 10,
                reservoir_refresh_interval_ms: 1_000,
            },
        }
    }
}

/// Built-in limits for a provider name; unknown names get the global default.
pub fn default_limits_for(provider: &str) -> LimiterConfig {
    provider
        .parse::<Provider>()
        .map(|p| p.default_limits())
        .unwrap_or_else(|_| LimiterConfig::global_default())
}
