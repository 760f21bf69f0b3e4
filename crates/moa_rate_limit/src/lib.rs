//! Hierarchical rate limiting for outbound SaaS API calls.
//!
//! Every request passes two token-bucket gates: the gate for its provider and
//! a single global gate shared by all providers. Each gate bounds concurrency,
//! spaces out dispatches, and draws from a periodically refilled reservoir.
//!
//! ## Provider Limits
//!
//! Built-in limits for known providers live in [`Provider`]; the bundled
//! `moa.toml` mirrors them and user config files can override any value.
//!
//! ```rust,ignore
//! use moa_rate_limit::LimiterRegistry;
//!
//! let registry = LimiterRegistry::shared();
//! let deals = registry.execute(Some("hubspot"), || fetch_deals()).await?;
//! ```

mod config;
mod limiter;
mod providers;
mod registry;

pub use config::{
    HttpDefaults, LimiterConfig, LimiterConfigBuilder, LimiterConfigBuilderError, MoaConfig,
    RateLimitConfig,
};
pub use limiter::{LimiterPermit, LimiterStats, TokenBucketLimiter};
pub use providers::{Provider, default_limits_for};
pub use registry::LimiterRegistry;
