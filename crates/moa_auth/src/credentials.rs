//! Stored credential records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this many milliseconds before their recorded expiry.
pub const EXPIRY_BUFFER_MS: i64 = 60_000;

/// How a provider token was issued.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenType {
    /// Static API key
    ApiKey,
    /// Bearer access token
    Bearer,
    /// OAuth access token, usually with a refresh token and expiry
    Oauth,
}

/// A provider credential as persisted in the credential store.
///
/// Serialized as camelCase JSON so files written by earlier moa releases
/// remain readable.
///
/// # Example
///
/// ```
/// use moa_auth::{Credentials, TokenType};
///
/// let creds = Credentials::builder()
///     .token("pat-na1-1234")
///     .token_type(TokenType::ApiKey)
///     .build()
///     .unwrap();
/// assert!(!creds.is_expired());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_builder::Builder,
    derive_getters::Getters,
)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into))]
pub struct Credentials {
    /// API key or access token
    token: String,
    /// How the token was issued
    token_type: TokenType,
    /// Refresh token for OAuth flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    refresh_token: Option<String>,
    /// Expiry as Unix epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    expires_at: Option<i64>,
}

impl Credentials {
    /// Creates a new credentials builder.
    pub fn builder() -> CredentialsBuilder {
        CredentialsBuilder::default()
    }

    /// A non-expiring API key.
    pub fn api_key(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type: TokenType::ApiKey,
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Recorded expiry, if any.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Expired (or within the safety buffer of expiring) at `now`.
    ///
    /// Credentials without an expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                now.timestamp_millis() >= expires_at.saturating_sub(EXPIRY_BUFFER_MS)
            }
            None => false,
        }
    }

    /// [`is_expired_at`](Self::is_expired_at) against the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
