//! Retry delay selection.
//!
//! A failed attempt waits either for the server's `Retry-After` hint or for an
//! exponential backoff step, never both. The policy is pure: it holds only the
//! two delay bounds and computes everything from its arguments.

use chrono::{DateTime, NaiveDateTime, Utc};
use moa_error::RetryableError;
use moa_rate_limit::HttpDefaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff bounded by a ceiling, with `Retry-After` override.
///
/// # Example
///
/// ```
/// use moa_http::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::default();
/// assert_eq!(policy.backoff_delay(2), Duration::from_millis(4_000));
/// assert_eq!(policy.delay_for(2, Some("1")), Duration::from_millis(1_000));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_getters::Getters,
)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry, in milliseconds
    base_delay_ms: u64,
    /// Upper bound for any computed delay, in milliseconds
    max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(1_000, 30_000)
    }
}

impl From<&HttpDefaults> for BackoffPolicy {
    fn from(defaults: &HttpDefaults) -> Self {
        Self::new(defaults.base_delay_ms, defaults.max_delay_ms)
    }
}

impl BackoffPolicy {
    /// Create a policy with explicit bounds.
    pub const fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// `min(base * 2^attempt, max)` for a zero-based attempt index.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Delay before retrying after `attempt` failed.
    ///
    /// A parseable `Retry-After` value wins regardless of the attempt index.
    /// Unparseable values fall through to exponential backoff.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<&str>) -> Duration {
        retry_after
            .and_then(parse_retry_after)
            .unwrap_or_else(|| self.backoff_delay(attempt))
    }

    /// Delay before the next attempt, or `None` if the failure is permanent.
    pub fn decide<E: RetryableError + ?Sized>(&self, error: &E, attempt: u32) -> Option<Duration> {
        error
            .is_retryable()
            .then(|| self.delay_for(attempt, error.retry_after()))
    }

    /// The backoff delays for attempts 0, 1, 2, ... without server hints.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + use<> {
        let policy = *self;
        (0..).map(move |attempt| policy.backoff_delay(attempt))
    }
}

/// Parse a `Retry-After` header value.
///
/// Integer values are seconds. Anything else is tried as an HTTP date in any
/// of its three forms (IMF-fixdate, RFC 850, asctime); a date in the past
/// yields zero.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    parse_retry_after_at(value, Utc::now())
}

/// [`parse_retry_after`] against an explicit clock.
pub fn parse_retry_after_at(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let target = parse_http_date(value)?;
    Some((target - now).to_std().unwrap_or(Duration::ZERO))
}

/// Obsolete HTTP-date layouts that recipients must still accept.
const LEGACY_HTTP_DATES: [&str; 2] = [
    // RFC 850: Sunday, 06-Nov-94 08:49:37 GMT
    "%A, %d-%b-%y %H:%M:%S GMT",
    // asctime: Sun Nov  6 08:49:37 1994
    "%a %b %e %H:%M:%S %Y",
];

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    // asctime pads single-digit days with a space
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    LEGACY_HTTP_DATES.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(&collapsed, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use moa_error::HttpErrorKind;

    #[test]
    fn test_exponential_sequence() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = policy
            .schedule()
            .take(4)
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(30_000));
        assert_eq!(policy.backoff_delay(64), Duration::from_millis(30_000));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_retry_after_seconds_override_backoff() {
        let policy = BackoffPolicy::default();
        for attempt in [0, 3, 9] {
            assert_eq!(policy.delay_for(attempt, Some("2")), Duration::from_millis(2_000));
        }
    }

    #[test]
    fn test_retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 30).unwrap();
        let delay = parse_retry_after_at("Wed, 21 Oct 2015 07:28:00 GMT", now).unwrap();
        assert_eq!(delay, Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_legacy_date_forms() {
        let now = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 7).unwrap();
        for value in [
            "Sun, 06 Nov 1994 08:49:37 GMT",
            "Sunday, 06-Nov-94 08:49:37 GMT",
            "Sun Nov  6 08:49:37 1994",
        ] {
            assert_eq!(
                parse_retry_after_at(value, now),
                Some(Duration::from_secs(30)),
                "{value}"
            );
        }
    }

    #[test]
    fn test_legacy_past_dates_are_zero() {
        assert_eq!(
            parse_retry_after("Sunday, 06-Nov-94 08:49:37 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("Sun Nov  6 08:49:37 1994"), Some(Duration::ZERO));
    }

    #[test]
    fn test_past_date_is_zero() {
        let delay = parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(delay, Duration::ZERO);

        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delay_for(4, Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            Duration::ZERO
        );
    }

    #[test]
    fn test_garbage_retry_after_falls_through() {
        assert_eq!(parse_retry_after("soon"), None);
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1, Some("soon")), Duration::from_millis(2_000));
    }

    #[test]
    fn test_decide_respects_classification() {
        let policy = BackoffPolicy::default();

        let missing = HttpErrorKind::from_status(404, None, "");
        assert_eq!(policy.decide(&missing, 0), None);

        let throttled = HttpErrorKind::from_status(429, Some("3".to_string()), "");
        assert_eq!(policy.decide(&throttled, 0), Some(Duration::from_secs(3)));

        let dropped = HttpErrorKind::Network("connection reset".to_string());
        assert_eq!(policy.decide(&dropped, 1), Some(Duration::from_millis(2_000)));
    }
}
