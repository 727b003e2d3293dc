use log::debug;

use crate::ratelimit::RateLimiter;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const RETRY_AFTER: &str = "retry-after";

/// Rate-limit feedback carried by one REST response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
    /// Window end, epoch millis
    pub reset_at: Option<i64>,
    pub global: bool,
    /// Server-requested backoff, millis
    pub retry_after: Option<i64>,
}

impl RateLimitHeaders {
    /// Read the rate-limit headers out of `(name, value)` pairs
    ///
    /// Names match case-insensitively. Unparseable values are ignored.
    pub fn parse<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut parsed = RateLimitHeaders::default();
        for (name, value) in headers {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                LIMIT => parsed.limit = value.parse().ok(),
                REMAINING => parsed.remaining = value.parse().ok(),
                RESET => parsed.reset_at = seconds_to_millis(value),
                GLOBAL => parsed.global = value.eq_ignore_ascii_case("true"),
                RETRY_AFTER => parsed.retry_after = seconds_to_millis(value),
                _ => {}
            }
        }
        parsed
    }

    pub fn from_header_map(headers: &reqwest::header::HeaderMap) -> Self {
        Self::parse(
            headers
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        )
    }

    /// Feed this response's quota into the limiter
    ///
    /// `update_done` is always the last call, so queued callers on `key` are
    /// reconsidered even when the response carried no headers at all.
    pub fn apply(&self, limiter: &RateLimiter, key: &str, too_many_requests: bool, now_ms: i64) {
        if self.global {
            let until = now_ms + self.retry_after.unwrap_or(1_000);
            debug!("{}: global rate limit hit, blocking all routes until {}", key, until);
            limiter.update_global_rate_limit(until);
        } else {
            if let Some(limit) = self.limit {
                limiter.update_limit(key, limit);
            }
            if let Some(remaining) = self.remaining {
                limiter.update_remaining(key, remaining);
            }
            match (self.reset_at, too_many_requests) {
                (Some(reset_at), _) => limiter.update_reset(key, reset_at),
                (None, true) => {
                    let until = now_ms + self.retry_after.unwrap_or(1_000);
                    limiter.update_remaining(key, 0);
                    limiter.update_reset(key, until);
                }
                (None, false) => {}
            }
        }
        limiter.update_done(key);
    }
}

/// Convert a decimal seconds value (e.g. `1470173023.123`) to millis
fn seconds_to_millis(value: &str) -> Option<i64> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    Some((seconds * 1_000.0).round() as i64)
}
