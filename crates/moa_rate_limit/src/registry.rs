//! Process-wide registry of provider limiters chained behind one global gate.

use crate::limiter::global_limiter;
use crate::{LimiterStats, MoaConfig, RateLimitConfig, TokenBucketLimiter};
use moa_error::RateLimitResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, instrument, warn};

static SHARED: OnceLock<Arc<LimiterRegistry>> = OnceLock::new();

/// Owns the global limiter and one lazily created limiter per provider.
///
/// Provider limiters are created on first use, chained behind the global
/// limiter, and cached for the registry's lifetime. Asking for the same
/// provider twice always returns the same `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use moa_rate_limit::LimiterRegistry;
///
/// let registry = LimiterRegistry::shared();
/// let contacts = registry
///     .execute(Some("hubspot"), || async { list_contacts().await })
///     .await?;
/// println!("{:?}", registry.stats(Some("hubspot")));
/// ```
pub struct LimiterRegistry {
    config: RateLimitConfig,
    global: Arc<TokenBucketLimiter>,
    providers: Mutex<HashMap<String, Arc<TokenBucketLimiter>>>,
}

impl std::fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.lock_providers().len();
        f.debug_struct("LimiterRegistry")
            .field("global", &self.global)
            .field("cached_providers", &cached)
            .finish_non_exhaustive()
    }
}

impl LimiterRegistry {
    /// Create a registry from configuration.
    ///
    /// Every entry is validated up front so a misconfigured provider fails here
    /// rather than on its first request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for the first entry that could never admit a task.
    #[instrument(skip(config))]
    pub fn new(config: RateLimitConfig) -> RateLimitResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Create a registry using the built-in provider table.
    pub fn with_defaults() -> Self {
        Self::from_validated(RateLimitConfig::default())
    }

    fn from_validated(config: RateLimitConfig) -> Self {
        info!(
            providers = config.providers.len(),
            "Creating limiter registry"
        );
        Self {
            global: global_limiter(&config),
            providers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The process-wide registry, created on first access.
    ///
    /// Built from [`MoaConfig::load`]; if loading or validation fails the
    /// built-in provider table is used instead.
    pub fn shared() -> Arc<LimiterRegistry> {
        Arc::clone(SHARED.get_or_init(|| {
            let config = match MoaConfig::load() {
                Ok(config) => config.rate_limits,
                Err(e) => {
                    warn!(error = %e, "Falling back to built-in rate limits");
                    RateLimitConfig::default()
                }
            };
            let registry = LimiterRegistry::new(config).unwrap_or_else(|e| {
                warn!(error = %e, "Invalid rate limit configuration, using built-in limits");
                LimiterRegistry::with_defaults()
            });
            Arc::new(registry)
        }))
    }

    /// The configuration this registry builds limiters from.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// The global limiter every provider limiter is chained behind.
    pub fn global(&self) -> &Arc<TokenBucketLimiter> {
        &self.global
    }

    /// Limiter for a provider, or the global limiter when `provider` is absent or empty.
    ///
    /// The first call for a provider creates its limiter; later calls return
    /// the cached instance.
    pub fn get_limiter(&self, provider: Option<&str>) -> Arc<TokenBucketLimiter> {
        let name = match provider {
            Some(name) if !name.is_empty() => name,
            _ => return Arc::clone(&self.global),
        };

        let mut providers = self.lock_providers();
        let limiter = providers.entry(name.to_string()).or_insert_with(|| {
            debug!(provider = name, "Creating provider limiter");
            Arc::new(TokenBucketLimiter::build(
                name.to_string(),
                self.config.limits_for(name),
                Some(Arc::clone(&self.global)),
            ))
        });
        Arc::clone(limiter)
    }

    /// Run `task` once the provider's limiter (and the global one) admit it.
    ///
    /// # Errors
    ///
    /// Returns an error only if admission itself fails; the task's own output
    /// is returned untouched.
    pub async fn execute<F, Fut, T>(&self, provider: Option<&str>, task: F) -> RateLimitResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.get_limiter(provider).schedule(task).await
    }

    /// Current counters for a provider's limiter (or the global limiter).
    pub fn stats(&self, provider: Option<&str>) -> LimiterStats {
        self.get_limiter(provider).stats()
    }

    /// Names of providers that have a limiter so far.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_providers().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock_providers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<TokenBucketLimiter>>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
