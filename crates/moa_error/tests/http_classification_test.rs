//! Tests for HTTP failure classification.

use moa_error::{HttpError, HttpErrorKind, RetryableError};

#[test]
fn test_status_classification() {
    assert!(matches!(
        HttpErrorKind::from_status(429, None, "slow down"),
        HttpErrorKind::RateLimited(_)
    ));
    assert!(matches!(
        HttpErrorKind::from_status(500, None, ""),
        HttpErrorKind::Server(_)
    ));
    assert!(matches!(
        HttpErrorKind::from_status(503, None, ""),
        HttpErrorKind::Server(_)
    ));
    assert!(matches!(
        HttpErrorKind::from_status(599, None, ""),
        HttpErrorKind::Server(_)
    ));
    assert!(matches!(
        HttpErrorKind::from_status(404, None, ""),
        HttpErrorKind::Client(_)
    ));
    assert!(matches!(
        HttpErrorKind::from_status(302, None, ""),
        HttpErrorKind::Client(_)
    ));
}

#[test]
fn test_retryable_failures() {
    assert!(HttpErrorKind::Network("reset".into()).is_retryable());
    assert!(HttpErrorKind::Timeout(30_000).is_retryable());
    assert!(HttpErrorKind::from_status(429, None, "").is_retryable());
    assert!(HttpErrorKind::from_status(502, None, "").is_retryable());
}

#[test]
fn test_permanent_failures() {
    for status in [400, 401, 403, 404, 409, 422] {
        assert!(
            !HttpErrorKind::from_status(status, None, "").is_retryable(),
            "{} should not be retried",
            status
        );
    }
    assert!(!HttpErrorKind::Decode("expected value".into()).is_retryable());
    assert!(!HttpErrorKind::InvalidRequest("bad url".into()).is_retryable());
}

#[test]
fn test_exhausted_budget_is_terminal_and_keeps_last_failure() {
    let last = HttpErrorKind::from_status(503, Some("7".into()), "down");
    let exhausted = HttpErrorKind::RetryBudgetExhausted {
        attempts: 3,
        last: Box::new(last.clone()),
    };

    assert!(!exhausted.is_retryable());
    assert_eq!(exhausted.root(), &last);
    assert_eq!(exhausted.status(), Some(503));
    assert_eq!(exhausted.retry_after(), Some("7"));
    assert!(format!("{}", exhausted).contains("3 attempts"));
}

#[test]
fn test_retry_after_exposed_through_trait() {
    let err = HttpError::new(HttpErrorKind::from_status(429, Some("2".into()), ""));
    assert!(RetryableError::is_retryable(&err));
    assert_eq!(RetryableError::retry_after(&err), Some("2"));

    let network = HttpError::new(HttpErrorKind::Network("refused".into()));
    assert_eq!(RetryableError::retry_after(&network), None);
}

#[test]
fn test_attempts_annotation() {
    let err = HttpError::new(HttpErrorKind::from_status(404, None, "")).with_attempts(1);
    assert_eq!(err.attempts, 1);
    assert!(format!("{}", err).contains("attempts: 1"));
}
