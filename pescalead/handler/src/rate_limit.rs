//! In-memory, per-process rate limiter.
//!
//! Requests are counted per `"{prefix}:{client ip}"` key in fixed windows.
//! The counters are best effort: they are lost on restart and are not shared
//! between instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;
use warp::http::{HeaderMap, HeaderValue, StatusCode};
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_at_ms: u64,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// End of the current window, in unix milliseconds.
    pub reset_at_ms: u64,
    /// Seconds until the window resets; only set when denied.
    pub retry_after_secs: Option<u64>,
}

/// Body of the 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TooManyRequestsBody {
    error: &'static str,
    retry_after: Option<u64>,
}

/// Rejection raised by [`limit`] when a client went over its budget.
#[derive(Debug)]
pub struct RateLimited(pub RateLimitDecision);

impl warp::reject::Reject for RateLimited {}

/// Window counter keyed by client and function prefix.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window_ms: u64,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl RateLimiter {
    /// Create a limiter from the configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window_ms: config.window.as_millis() as u64,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request from `ip` against the `prefix` budget.
    pub fn check(&self, prefix: &str, ip: &str) -> RateLimitDecision {
        self.check_at(prefix, ip, now_ms())
    }

    fn check_at(&self, prefix: &str, ip: &str, now: u64) -> RateLimitDecision {
        let key = format!("{prefix}:{ip}");
        let mut entries = self.entries();

        let entry = entries
            .entry(key)
            .or_insert(RateLimitEntry { count: 0, reset_at_ms: 0 });

        // Fresh key or finished window.
        if entry.count == 0 || entry.reset_at_ms < now {
            *entry = RateLimitEntry {
                count: 1,
                reset_at_ms: now + self.window_ms,
            };
            return RateLimitDecision {
                allowed: true,
                remaining: self.max_requests.saturating_sub(1),
                reset_at_ms: entry.reset_at_ms,
                retry_after_secs: None,
            };
        }

        entry.count += 1;

        if entry.count > self.max_requests {
            let retry_after = (entry.reset_at_ms - now).div_ceil(1000);
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms: entry.reset_at_ms,
                retry_after_secs: Some(retry_after),
            };
        }

        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            reset_at_ms: entry.reset_at_ms,
            retry_after_secs: None,
        }
    }

    /// Drop every entry whose window is over. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(now_ms())
    }

    fn sweep_at(&self, now: u64) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at_ms >= now);
        before - entries.len()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep expired entries every `interval` until the runtime shuts down.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired rate limit entries");
                }
            }
        })
    }
}

/// Extract the client IP from proxy headers.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        return forwarded.split(',').next().unwrap_or_default().trim().to_string();
    }

    header("x-real-ip")
        .or_else(|| header("cf-connecting-ip"))
        .unwrap_or("unknown")
        .to_string()
}

impl RateLimitDecision {
    /// Add the rate limit headers to a reply.
    pub fn apply(&self, reply: impl Reply) -> Response {
        let mut response = reply.into_response();
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset_at_ms / 1000));
        if let Some(retry_after) = self.retry_after_secs {
            headers.insert("Retry-After", HeaderValue::from(retry_after));
        }
        response
    }

    /// The 429 reply for a denied request.
    pub fn too_many_requests(&self) -> Response {
        let body = TooManyRequestsBody {
            error: "Too many requests",
            retry_after: self.retry_after_secs,
        };
        self.apply(warp::reply::with_status(
            warp::reply::json(&body),
            StatusCode::TOO_MANY_REQUESTS,
        ))
    }
}

/// Filter that counts the request and rejects with [`RateLimited`] once the
/// client is over budget.
pub fn limit(
    limiter: Arc<RateLimiter>,
    prefix: &'static str,
) -> impl Filter<Extract = (RateLimitDecision,), Error = Rejection> + Clone {
    warp::header::headers_cloned().and_then(move |headers: HeaderMap| {
        let limiter = Arc::clone(&limiter);
        async move {
            let decision = limiter.check(prefix, &client_ip(&headers));
            if decision.allowed {
                Ok(decision)
            } else {
                Err(warp::reject::custom(RateLimited(decision)))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_case::test_case;

    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
            sweep_interval: Duration::from_secs(60),
        })
    }

    #[test]
    fn first_request_opens_a_window() {
        let limiter = limiter(5, 60);
        let decision = limiter.check_at("cnpj-api", "1.2.3.4", 1_000);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_at_ms, 61_000);
        assert_eq!(decision.retry_after_secs, None);
    }

    #[test]
    fn requests_over_the_budget_are_denied() {
        let limiter = limiter(2, 60);
        assert!(limiter.check_at("p", "ip", 0).allowed);
        assert_eq!(limiter.check_at("p", "ip", 10).remaining, 0);

        let denied = limiter.check_at("p", "ip", 20_500);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        // 39.5 seconds left rounds up.
        assert_eq!(denied.retry_after_secs, Some(40));
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = limiter(1, 1);
        assert!(limiter.check_at("p", "ip", 0).allowed);
        assert!(!limiter.check_at("p", "ip", 500).allowed);

        let decision = limiter.check_at("p", "ip", 1_001);
        assert!(decision.allowed);
        assert_eq!(decision.reset_at_ms, 2_001);
    }

    #[test]
    fn prefixes_and_ips_are_counted_separately() {
        let limiter = limiter(1, 60);
        assert!(limiter.check_at("a", "ip", 0).allowed);
        assert!(limiter.check_at("b", "ip", 0).allowed);
        assert!(limiter.check_at("a", "other", 0).allowed);
        assert!(!limiter.check_at("a", "ip", 0).allowed);
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let limiter = limiter(10, 1);
        limiter.check_at("p", "old", 0);
        limiter.check_at("p", "new", 5_000);

        assert_eq!(limiter.sweep_at(3_000), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test_case(&[("x-forwarded-for", " 10.0.0.1 , 10.0.0.2")], "10.0.0.1"; "first forwarded address")]
    #[test_case(&[("x-real-ip", "10.0.0.3"), ("cf-connecting-ip", "10.0.0.4")], "10.0.0.3"; "real ip before cloudflare")]
    #[test_case(&[("cf-connecting-ip", "10.0.0.4")], "10.0.0.4"; "cloudflare")]
    #[test_case(&[], "unknown"; "no headers")]
    fn client_ip_reads_proxy_headers(pairs: &[(&'static str, &'static str)], expected: &str) {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        assert_eq!(client_ip(&headers), expected);
    }

    #[tokio::test]
    async fn denied_reply_carries_headers_and_body() {
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at_ms: 1_700_000_000_999,
            retry_after_secs: Some(12),
        };
        let response = decision.too_many_requests();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
        assert_eq!(response.headers()["X-RateLimit-Reset"], "1700000000");
        assert_eq!(response.headers()["Retry-After"], "12");

        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Too many requests");
        assert_eq!(json["retryAfter"], 12);
    }

    #[tokio::test]
    async fn filter_rejects_over_budget_clients() {
        let limiter = Arc::new(limiter(1, 60));
        let filter = limit(limiter, "test");

        let first = warp::test::request()
            .header("x-real-ip", "9.9.9.9")
            .filter(&filter)
            .await;
        assert!(first.is_ok());

        let second = warp::test::request()
            .header("x-real-ip", "9.9.9.9")
            .filter(&filter)
            .await;
        let rejection = second.unwrap_err();
        assert!(rejection.find::<RateLimited>().is_some());
    }
}
