//! Tracing subscriber setup for binaries and tests.
//!
//! The filter comes from `RUST_LOG` when set, otherwise `info`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a human-readable console subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    tracing::debug!("Console tracing initialized");
    Ok(())
}

/// Install a JSON-lines subscriber, for log shipping.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_json_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()?;
    tracing::debug!("JSON tracing initialized");
    Ok(())
}
