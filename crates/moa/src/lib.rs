//! moa - resilient access to marketing SaaS APIs
//!
//! moa wraps outbound calls to providers such as HubSpot, Semrush and Meta in
//! a two-tier rate limiter and a retrying request executor, and keeps the
//! credentials and profiles those calls need.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use moa::{AuthManager, HttpClientConfig, RequestExecutor, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     moa::telemetry::init_tracing()?;
//!
//!     let auth = AuthManager::open_default()?;
//!     let hubspot = RequestExecutor::new(
//!         HttpClientConfig::builder()
//!             .base_url("https://api.hubapi.com")
//!             .provider("hubspot")
//!             .build()?,
//!     )?;
//!     hubspot.authorize_with(&auth, "default")?;
//!
//!     let contacts = hubspot
//!         .get("/crm/v3/objects/contacts", RequestOptions::new().query("limit", "10"))
//!         .await?;
//!     println!("{}", contacts.text());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `moa_error` - Error types
//! - `moa_rate_limit` - Token-bucket limiters, provider limits, configuration loading
//! - `moa_http` - Request executor, retry and backoff
//! - `moa_auth` - Credential storage and profiles
//!
//! This crate re-exports everything for convenience.

pub use moa_auth::*;
pub use moa_error::*;
pub use moa_http::*;
pub use moa_rate_limit::*;

pub mod telemetry;
