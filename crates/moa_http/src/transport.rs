//! The network seam between the executor and an HTTP implementation.

use async_trait::async_trait;
use moa_error::{HttpError, HttpErrorKind};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// A fully prepared request: absolute URL, final headers, optional JSON body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including query string
    pub url: Url,
    /// Headers to send, auth included
    pub headers: HeaderMap,
    /// JSON body, if any
    pub body: Option<serde_json::Value>,
    /// Wall-clock budget for this attempt
    pub timeout: Duration,
}

/// A response of any status, body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a non-retryable `Decode` error if the body does not match `T`.
    #[track_caller]
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::new(HttpErrorKind::Decode(e.to_string())))
    }
}

/// Performs a single HTTP exchange.
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; classification is the executor's job. `Err` is reserved for
/// exchanges that produced no response.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send `request` and read the whole response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpErrorKind>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh connection pool.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the TLS backend cannot be initialised.
    #[track_caller]
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("moa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::new(HttpErrorKind::InvalidRequest(e.to_string())))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Map a reqwest failure onto the taxonomy.
fn classify(error: reqwest::Error, timeout: Duration) -> HttpErrorKind {
    if error.is_timeout() {
        HttpErrorKind::Timeout(timeout.as_millis() as u64)
    } else if error.is_builder() {
        HttpErrorKind::InvalidRequest(error.to_string())
    } else {
        HttpErrorKind::Network(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpErrorKind> {
        let timeout = request.timeout;
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, timeout))?
            .to_vec();

        debug!(status, bytes = body.len(), "Received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_success_range() {
        assert!(response(200, "").is_success());
        assert!(response(204, "").is_success());
        assert!(!response(304, "").is_success());
        assert!(!response(429, "").is_success());
    }

    #[test]
    fn test_json_decode_failure_is_permanent() {
        let err = response(200, "not json")
            .json::<serde_json::Value>()
            .unwrap_err();
        assert!(matches!(err.kind(), HttpErrorKind::Decode(_)));
        assert!(!err.kind().is_retryable());
    }

    #[test]
    fn test_header_lookup() {
        let mut resp = response(429, "slow down");
        resp.headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(resp.header("retry-after"), Some("7"));
        assert_eq!(resp.text(), "slow down");
    }
}
