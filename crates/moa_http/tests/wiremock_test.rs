//! End-to-end tests of the reqwest transport against a local mock server.

mod test_utils;

use moa_error::HttpErrorKind;
use moa_http::{
    AuthScheme, BackoffPolicy, HttpClientConfig, ReqwestTransport, RequestExecutor,
    RequestOptions,
};
use std::sync::Arc;
use std::time::Duration;
use test_utils::test_registry;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(base_url: &str, max_retries: u32, timeout_ms: u64) -> anyhow::Result<RequestExecutor> {
    let config = HttpClientConfig::builder()
        .base_url(base_url)
        .provider("mock")
        .max_retries(max_retries)
        .timeout_ms(timeout_ms)
        .backoff(BackoffPolicy::new(10, 50))
        .build()?;
    Ok(RequestExecutor::with_parts(
        config,
        test_registry(),
        Arc::new(ReqwestTransport::new()?),
    )?)
}

#[tokio::test]
async fn test_get_with_auth_and_query() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v3/contacts"))
        .and(query_param("limit", "10"))
        .and(header("authorization", "Bearer pat-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"id": "1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 3, 5_000)?;
    client.set_auth_header("pat-123", AuthScheme::Bearer)?;

    let resp = client
        .get("/crm/v3/contacts", RequestOptions::new().query("limit", "10"))
        .await?;
    let body: serde_json::Value = resp.json()?;

    assert!(resp.is_success());
    assert_eq!(body["results"][0]["id"], "1");
    Ok(())
}

#[tokio::test]
async fn test_post_sends_json_body() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let payload = serde_json::json!({"properties": {"email": "a@example.com"}});
    Mock::given(method("POST"))
        .and(path("/contacts"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 3, 5_000)?;
    let resp = client
        .post("/contacts", Some(payload.clone()), RequestOptions::new())
        .await?;

    assert_eq!(resp.status, 201);
    Ok(())
}

#[tokio::test]
async fn test_server_error_then_success() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deals"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deals"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 3, 5_000)?;
    let resp = client.get("/deals", RequestOptions::new()).await?;

    assert_eq!(resp.text(), "[]");
    Ok(())
}

#[tokio::test]
async fn test_not_found_hits_server_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/contacts/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such contact"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 3, 5_000)?;
    let err = client
        .delete("/contacts/404", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(err.kind().status(), Some(404));
    match err.kind() {
        HttpErrorKind::Client(failure) => assert_eq!(failure.body, "no such contact"),
        other => panic!("expected client error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_carries_retry_after() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 2, 5_000)?;
    let err = client.get("/keywords", RequestOptions::new()).await.unwrap_err();

    assert!(matches!(
        err.kind(),
        HttpErrorKind::RetryBudgetExhausted { attempts: 2, .. }
    ));
    assert_eq!(err.kind().status(), Some(429));
    assert_eq!(err.kind().retry_after(), Some("0"));
    Ok(())
}

#[tokio::test]
async fn test_slow_server_times_out() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 2, 50)?;
    let err = client.get("/slow", RequestOptions::new()).await.unwrap_err();

    assert!(matches!(err.kind().root(), HttpErrorKind::Timeout(50)));
    assert_eq!(err.attempts, 2);
    Ok(())
}

#[tokio::test]
async fn test_connection_refused_is_network_failure() -> anyhow::Result<()> {
    // Bind and drop a listener so the port is known to be closed.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };

    let client = client_for(&format!("http://127.0.0.1:{port}"), 2, 1_000)?;
    let err = client.get("/", RequestOptions::new()).await.unwrap_err();

    assert!(err.kind().root().is_network_failure());
    assert!(matches!(
        err.kind(),
        HttpErrorKind::RetryBudgetExhausted { attempts: 2, .. }
    ));
    Ok(())
}
