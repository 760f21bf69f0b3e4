//! Shared fixtures for executor tests.

#![allow(dead_code)]

use async_trait::async_trait;
use moa_error::HttpErrorKind;
use moa_http::{HttpRequest, HttpResponse, Transport};
use moa_rate_limit::{LimiterConfig, LimiterRegistry, RateLimitConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Generous limits without spacing, so timing assertions only see retry delays.
pub fn unspaced_limits() -> LimiterConfig {
    LimiterConfig {
        max_concurrent: 5,
        min_time_ms: 0,
        reservoir: 100,
        reservoir_refresh_amount: 100,
        reservoir_refresh_interval_ms: 1_000,
    }
}

pub fn test_registry() -> Arc<LimiterRegistry> {
    let mut config = RateLimitConfig {
        global: unspaced_limits(),
        default: unspaced_limits(),
        ..RateLimitConfig::default()
    };
    config.providers.insert("mock".to_string(), unspaced_limits());
    Arc::new(LimiterRegistry::new(config).expect("valid test limits"))
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: HeaderMap::new(),
        body: body.as_bytes().to_vec(),
    }
}

pub fn response_with_header(status: u16, name: &'static str, value: &str) -> HttpResponse {
    let mut resp = response(status, "");
    resp.headers.insert(
        HeaderName::from_static(name),
        HeaderValue::from_str(value).expect("valid header"),
    );
    resp
}

/// Replays scripted outcomes in order, repeating the last one forever.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse, HttpErrorKind>>>,
    last: Mutex<Option<Result<HttpResponse, HttpErrorKind>>>,
    latency: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn scripted(outcomes: Vec<Result<HttpResponse, HttpErrorKind>>) -> Arc<Self> {
        Arc::new(Self::build(outcomes, Duration::ZERO))
    }

    pub fn always(status: u16) -> Arc<Self> {
        Self::scripted(vec![Ok(response(status, ""))])
    }

    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self::build(vec![Ok(response(200, ""))], latency))
    }

    fn build(outcomes: Vec<Result<HttpResponse, HttpErrorKind>>, latency: Duration) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(None),
            latency,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> Result<HttpResponse, HttpErrorKind> {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(outcome) = script.pop_front() {
            *last = Some(outcome);
        }
        last.clone()
            .unwrap_or_else(|| Err(HttpErrorKind::Network("empty script".to_string())))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpErrorKind> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.next_outcome()
    }
}
