//! Resilient HTTP calls for moa's SaaS integrations.
//!
//! [`RequestExecutor`] routes every attempt through the
//! [`LimiterRegistry`](moa_rate_limit::LimiterRegistry), retries network
//! failures, timeouts, 429 and 5xx responses with [`BackoffPolicy`], and
//! surfaces everything else immediately.
//!
//! The network itself sits behind the [`Transport`] trait; production code
//! uses [`ReqwestTransport`].

mod backoff;
mod client;
mod transport;

pub use backoff::{BackoffPolicy, parse_retry_after, parse_retry_after_at};
pub use client::{
    AuthScheme, HttpClientConfig, HttpClientConfigBuilder, HttpClientConfigBuilderError,
    RequestExecutor, RequestOptions, RequestSpec, TokenSource,
};
pub use reqwest::Method;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
