//! Rate-limited, retrying request executor.

use crate::{BackoffPolicy, HttpRequest, HttpResponse, ReqwestTransport, Transport};
use moa_error::{HttpError, HttpErrorKind, MoaResult};
use moa_rate_limit::{HttpDefaults, LimiterRegistry};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, info, instrument, warn};

/// Settings owned by one [`RequestExecutor`].
///
/// # Example
///
/// ```
/// use moa_http::HttpClientConfig;
///
/// let config = HttpClientConfig::builder()
///     .base_url("https://api.hubapi.com")
///     .provider("hubspot")
///     .build()
///     .unwrap();
/// assert_eq!(*config.max_retries(), 3);
/// assert_eq!(*config.timeout_ms(), 30_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, derive_builder::Builder, derive_getters::Getters)]
#[builder(setter(into))]
pub struct HttpClientConfig {
    /// Prefix for relative request paths; may be empty when paths are absolute
    #[builder(default)]
    base_url: String,

    /// Per-attempt wall-clock timeout in milliseconds
    #[builder(default = "30_000")]
    timeout_ms: u64,

    /// Total attempts a call may make; 0 behaves like 1
    #[builder(default = "3")]
    max_retries: u32,

    /// Limiter to admit requests through; `None` uses only the global limiter
    #[builder(default, setter(into, strip_option))]
    provider: Option<String>,

    /// Headers sent with every request
    #[builder(default)]
    headers: Vec<(String, String)>,

    /// Delay selection between attempts
    #[builder(default)]
    backoff: BackoffPolicy,
}

impl HttpClientConfig {
    /// Creates a new config builder.
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }

    /// A builder pre-filled from loaded configuration defaults.
    pub fn from_defaults(defaults: &HttpDefaults) -> HttpClientConfigBuilder {
        let mut builder = HttpClientConfigBuilder::default();
        builder
            .timeout_ms(defaults.timeout_ms)
            .max_retries(defaults.max_retries)
            .backoff(BackoffPolicy::from(defaults));
        builder
    }

    /// Attempts allowed per call, never less than one.
    pub fn attempt_budget(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Per-call additions to the executor's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    timeout_ms: Option<u64>,
}

impl RequestOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; it overrides a default header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Override the per-attempt timeout for this call.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Everything needed to issue one logical call.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    /// JSON body
    pub body: Option<serde_json::Value>,
    /// Per-call options
    pub options: RequestOptions,
}

impl RequestSpec {
    /// A bodiless request with default options.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replace the per-call options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Authorization header scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    #[default]
    Bearer,
    /// `Authorization: Basic <token>`
    Basic,
}

/// Supplies stored tokens for a provider and profile.
pub trait TokenSource: Send + Sync {
    /// The usable token, or `None` if none is stored or it has expired.
    fn token(&self, provider: &str, profile: &str) -> MoaResult<Option<String>>;
}

/// Issues HTTP calls through the rate limiter with retry and backoff.
///
/// Every attempt, retries included, is admitted by the provider limiter and
/// the global limiter before it touches the network. Network failures,
/// timeouts, 429 and 5xx responses are retried until the attempt budget is
/// spent; anything else fails immediately.
///
/// # Example
///
/// ```rust,ignore
/// use moa_http::{HttpClientConfig, RequestExecutor, RequestOptions};
///
/// let client = RequestExecutor::new(
///     HttpClientConfig::builder()
///         .base_url("https://api.semrush.com")
///         .provider("semrush")
///         .build()?,
/// )?;
/// client.set_auth_header("secret", Default::default())?;
/// let response = client.get("/analytics/v1", RequestOptions::new()).await?;
/// ```
#[derive(Debug)]
pub struct RequestExecutor {
    config: HttpClientConfig,
    default_headers: HeaderMap,
    auth: RwLock<Option<HeaderValue>>,
    registry: Arc<LimiterRegistry>,
    transport: Arc<dyn Transport>,
}

impl RequestExecutor {
    /// Executor using the shared limiter registry and a reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if a default header is malformed or the
    /// transport cannot be built.
    pub fn new(config: HttpClientConfig) -> Result<Self, HttpError> {
        let transport = ReqwestTransport::new()?;
        Self::with_parts(config, LimiterRegistry::shared(), Arc::new(transport))
    }

    /// Executor with an explicit registry and transport.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if a default header is malformed.
    #[track_caller]
    pub fn with_parts(
        config: HttpClientConfig,
        registry: Arc<LimiterRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, HttpError> {
        let default_headers = header_map(&config.headers).map_err(HttpError::new)?;
        info!(
            base_url = %config.base_url,
            provider = ?config.provider,
            max_retries = config.max_retries,
            "Creating request executor"
        );
        Ok(Self {
            config,
            default_headers,
            auth: RwLock::new(None),
            registry,
            transport,
        })
    }

    /// The executor's configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// The registry admitting this executor's requests.
    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }

    /// Install an `Authorization` header for all subsequent requests.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the token is not a valid header value.
    #[track_caller]
    pub fn set_auth_header(&self, token: &str, scheme: AuthScheme) -> Result<(), HttpError> {
        let mut value = HeaderValue::from_str(&format!("{} {}", scheme, token))
            .map_err(|e| HttpError::new(HttpErrorKind::InvalidRequest(e.to_string())))?;
        value.set_sensitive(true);
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
        debug!(%scheme, "Authorization header set");
        Ok(())
    }

    /// Remove the `Authorization` header from subsequent requests.
    pub fn clear_auth_header(&self) {
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("Authorization header cleared");
    }

    /// True while an `Authorization` header is installed.
    pub fn has_auth_header(&self) -> bool {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Install the stored token for this executor's provider as a bearer token.
    ///
    /// Clears the header when no usable token exists. Returns whether a token
    /// was installed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the executor has no provider, or whatever
    /// the token source reports.
    pub fn authorize_with(&self, source: &dyn TokenSource, profile: &str) -> MoaResult<bool> {
        let Some(provider) = self.config.provider.as_deref() else {
            return Err(HttpError::new(HttpErrorKind::InvalidRequest(
                "executor has no provider to look up credentials for".to_string(),
            ))
            .into());
        };

        match source.token(provider, profile)? {
            Some(token) => {
                self.set_auth_header(&token, AuthScheme::Bearer)?;
                Ok(true)
            }
            None => {
                warn!(provider, profile, "No usable credentials stored");
                self.clear_auth_header();
                Ok(false)
            }
        }
    }

    /// `GET path`
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<HttpResponse, HttpError> {
        self.execute(RequestSpec::new(Method::GET, path).with_options(options))
            .await
    }

    /// `POST path` with an optional JSON body
    pub async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        self.execute(with_optional_body(Method::POST, path, body, options))
            .await
    }

    /// `PUT path` with an optional JSON body
    pub async fn put(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        self.execute(with_optional_body(Method::PUT, path, body, options))
            .await
    }

    /// `PATCH path` with an optional JSON body
    pub async fn patch(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        self.execute(with_optional_body(Method::PATCH, path, body, options))
            .await
    }

    /// `DELETE path`
    pub async fn delete(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        self.execute(RequestSpec::new(Method::DELETE, path).with_options(options))
            .await
    }

    /// Issue a call, retrying transient failures within the attempt budget.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the URL or a header cannot be built (no attempt made)
    /// - the original failure, with attempt count, if it is not retryable
    /// - `RetryBudgetExhausted` wrapping the last failure once every attempt failed
    #[instrument(
        skip(self, spec),
        fields(
            method = %spec.method,
            path = %spec.path,
            provider = self.config.provider.as_deref().unwrap_or("global"),
        )
    )]
    pub async fn execute(&self, spec: RequestSpec) -> Result<HttpResponse, HttpError> {
        let request = self.prepare(&spec)?;
        let budget = self.config.attempt_budget();
        let policy = self.config.backoff;
        let attempts = AtomicU32::new(0);
        let attempts_ref = &attempts;
        let request_ref = &request;
        // The action writes the delay it decided on; the strategy only replays it.
        let next_delay: Mutex<Option<Duration>> = Mutex::new(None);
        let next_delay_ref = &next_delay;

        let strategy = std::iter::from_fn(move || {
            next_delay_ref
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        });
        let outcome = Retry::spawn(strategy, move || async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst);
            match self.attempt(request_ref.clone(), attempt).await {
                Ok(response) => Ok(response),
                Err(failure) => match policy.decide(&failure, attempt) {
                    Some(delay) if attempt + 1 < budget => {
                        warn!(
                            attempt = attempt + 1,
                            budget,
                            delay_ms = millis(delay),
                            error = %failure,
                            "Request failed, retrying"
                        );
                        *next_delay_ref
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
                        Err(RetryError::Transient {
                            err: failure,
                            retry_after: Some(delay),
                        })
                    }
                    _ => Err(RetryError::Permanent(failure)),
                },
            }
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(response) => {
                debug!(attempts, status = response.status, "Request succeeded");
                Ok(response)
            }
            Err(failure) if failure.is_retryable() => {
                warn!(attempts, error = %failure, "Retry budget exhausted");
                Err(HttpError::new(HttpErrorKind::RetryBudgetExhausted {
                    attempts,
                    last: Box::new(failure),
                })
                .with_attempts(attempts))
            }
            Err(failure) => {
                debug!(attempts, error = %failure, "Request failed permanently");
                Err(HttpError::new(failure).with_attempts(attempts))
            }
        }
    }

    /// One admitted exchange; non-success statuses become failures.
    #[instrument(skip(self, request))]
    async fn attempt(&self, request: HttpRequest, attempt: u32) -> Result<HttpResponse, HttpErrorKind> {
        let timeout = request.timeout;
        let exchange = self
            .registry
            .execute(self.config.provider.as_deref(), move || async move {
                debug!("Dispatching request");
                match tokio::time::timeout(timeout, self.transport.send(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(HttpErrorKind::Timeout(millis(timeout))),
                }
            })
            .await
            .map_err(|e| HttpErrorKind::Admission(e.to_string()))?;

        let response = exchange?;
        if response.is_success() {
            return Ok(response);
        }
        Err(HttpErrorKind::from_status(
            response.status,
            response.header("retry-after").map(str::to_string),
            response.text(),
        ))
    }

    /// Resolve the URL and merge default, auth, and per-call headers.
    #[track_caller]
    fn prepare(&self, spec: &RequestSpec) -> Result<HttpRequest, HttpError> {
        let mut url = resolve_url(&self.config.base_url, &spec.path).map_err(HttpError::new)?;
        if !spec.options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&spec.options.query);
        }

        let mut headers = self.default_headers.clone();
        if let Some(auth) = self
            .auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            headers.insert(AUTHORIZATION, auth);
        }
        headers.extend(header_map(&spec.options.headers).map_err(HttpError::new)?);

        let timeout_ms = spec.options.timeout_ms.unwrap_or(self.config.timeout_ms);
        Ok(HttpRequest {
            method: spec.method.clone(),
            url,
            headers,
            body: spec.body.clone(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn with_optional_body(
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
    options: RequestOptions,
) -> RequestSpec {
    RequestSpec {
        method,
        path: path.to_string(),
        body,
        options,
    }
}

/// Join a path onto the base URL; absolute URLs are used as given.
fn resolve_url(base_url: &str, path: &str) -> Result<Url, HttpErrorKind> {
    let joined = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.is_empty() {
        base_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    Url::parse(&joined)
        .map_err(|e| HttpErrorKind::InvalidRequest(format!("invalid URL {:?}: {}", joined, e)))
}

fn header_map(pairs: &[(String, String)]) -> Result<HeaderMap, HttpErrorKind> {
    let mut map = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            HttpErrorKind::InvalidRequest(format!("invalid header name {:?}: {}", name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            HttpErrorKind::InvalidRequest(format!("invalid value for header {:?}: {}", name, e))
        })?;
        map.insert(header, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(millis(Duration::from_secs(u64::MAX)), u64::MAX);
    }

    #[test]
    fn test_resolve_url_joins_with_single_slash() {
        let url = resolve_url("https://api.example.com/v3/", "/contacts").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v3/contacts");

        let url = resolve_url("https://api.example.com/v3", "contacts").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v3/contacts");
    }

    #[test]
    fn test_absolute_path_ignores_base() {
        let url = resolve_url("https://api.example.com", "https://other.example.com/x").unwrap();
        assert_eq!(url.host_str(), Some("other.example.com"));
    }

    #[test]
    fn test_unparseable_url_is_invalid_request() {
        let err = resolve_url("", "/relative-only").unwrap_err();
        assert!(matches!(err, HttpErrorKind::InvalidRequest(_)));
    }

    #[test]
    fn test_bad_header_rejected() {
        let pairs = vec![("bad header".to_string(), "x".to_string())];
        assert!(header_map(&pairs).is_err());
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let config = HttpClientConfig::builder().max_retries(0u32).build().unwrap();
        assert_eq!(config.attempt_budget(), 1);
    }

    #[test]
    fn test_config_from_defaults() {
        let defaults = HttpDefaults {
            timeout_ms: 5_000,
            max_retries: 4,
            base_delay_ms: 10,
            max_delay_ms: 100,
        };
        let config = HttpClientConfig::from_defaults(&defaults)
            .base_url("https://api.example.com")
            .build()
            .unwrap();
        assert_eq!(*config.timeout_ms(), 5_000);
        assert_eq!(*config.max_retries(), 4);
        assert_eq!(*config.backoff(), BackoffPolicy::new(10, 100));
    }

    #[test]
    fn test_auth_scheme_display() {
        assert_eq!(AuthScheme::Bearer.to_string(), "Bearer");
        assert_eq!(AuthScheme::Basic.to_string(), "Basic");
    }
}
