//! Request admission: a per-caller rate limiter and the admin token check.
use axum::http::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const WINDOW: Duration = Duration::from_secs(60);
// buckets are swept once the map grows past this many callers
const SWEEP_THRESHOLD: usize = 4096;

/// Sliding one-minute window counting requests per caller key.
pub struct RateLimiter {
    limit: usize,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: usize) -> Self {
        Self {
            limit: limit_per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admits the request or returns how long the caller has to wait.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if buckets.len() > SWEEP_THRESHOLD {
            buckets.retain(|_, bucket| {
                bucket
                    .back()
                    .is_some_and(|t| now.saturating_duration_since(*t) < WINDOW)
            });
        }

        let bucket = buckets.entry(key.to_owned()).or_default();
        while bucket
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= WINDOW)
        {
            bucket.pop_front();
        }
        if bucket.len() >= self.limit {
            let oldest = bucket.front().copied().unwrap_or(now);
            return Err(WINDOW.saturating_sub(now.saturating_duration_since(oldest)));
        }
        bucket.push_back(now);
        Ok(())
    }
}

/// Identifies the caller by the first forwarded hop, falling back to `x-real-ip`.
pub fn caller_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_owned()
}

/// Exact match of the presented admin token against the configured secret.
/// Both sides are hashed first so the comparison runs over equal-length digests.
pub fn token_matches(presented: Option<&str>, expected: &str) -> bool {
    match presented {
        Some(token) if !expected.is_empty() => sha256::digest(token) == sha256::digest(expected),
        _ => false,
    }
}

pub fn admin_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn limiter_caps_requests_per_window() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", start).is_ok());
        }
        let wait = limiter.check_at("10.0.0.1", start).unwrap_err();
        assert_eq!(wait, WINDOW);

        // other callers have their own bucket
        assert!(limiter.check_at("10.0.0.2", start).is_ok());

        // the window slides
        assert!(limiter.check_at("10.0.0.1", start + WINDOW).is_ok());
    }

    #[test]
    fn caller_key_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_key(&headers), "anonymous");

        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.9"));
        assert_eq!(caller_key(&headers), "192.168.1.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(caller_key(&headers), "203.0.113.7");
    }

    #[test]
    fn token_must_match_exactly() {
        assert!(token_matches(Some("s3cret"), "s3cret"));
        assert!(!token_matches(Some("s3cret "), "s3cret"));
        assert!(!token_matches(Some("S3CRET"), "s3cret"));
        assert!(!token_matches(None, "s3cret"));
        assert!(!token_matches(Some(""), ""));
    }
}
