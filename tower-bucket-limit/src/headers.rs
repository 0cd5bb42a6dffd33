use std::time::Duration;

use http::HeaderMap;
use http::HeaderValue;
use http::header::HeaderName;

/// Maximum number of requests the bucket holds.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Tokens left after this request.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Seconds since the last admitted request. Only present on rejected requests.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// The `X-RateLimit-*` values for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: u64,
    pub reset: Option<Duration>,
}

impl RateLimitHeaders {
    /// Writes the headers into `headers`.
    ///
    /// Values already present are left alone, so a responder or downstream service which
    /// sets its own `X-RateLimit-*` headers has the final word.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers
            .entry(X_RATELIMIT_LIMIT)
            .or_insert_with(|| HeaderValue::from(self.limit));
        headers
            .entry(X_RATELIMIT_REMAINING)
            .or_insert_with(|| HeaderValue::from(self.remaining));
        if let Some(reset) = self.reset {
            headers
                .entry(X_RATELIMIT_RESET)
                .or_insert_with(|| HeaderValue::from(reset.as_secs()));
        }
    }
}
