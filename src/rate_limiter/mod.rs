/*!
 * # Rate Limiting
 *
 * Fixed-window, per-client request limiting for the `/api` surface.
 *
 * - Clients are keyed by the first `x-forwarded-for` hop, then `x-real-ip`,
 *   then the socket address
 * - Counters live in a `DashMap` and are swept by [`start_cleanup_task`]
 * - Standard rate limit headers (X-RateLimit-*) on every response
 */

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use metrics::counter;
use tracing::{debug, warn};

use crate::{config::AppConfig, errors::ServiceError};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

fn num_to_header_value<T: ToString>(n: T) -> http::HeaderValue {
    http::HeaderValue::from_str(&n.to_string())
        .unwrap_or_else(|_| http::HeaderValue::from_static("0"))
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

impl From<&AppConfig> for RateLimitConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            requests_per_window: config.rate_limit_requests_per_window,
            window_duration: Duration::from_secs(config.rate_limit_window_seconds.max(1)),
            enable_headers: config.rate_limit_enable_headers,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn roll(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn time_until_reset(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.duration_since(self.window_start))
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        let window = self.config.window_duration;
        let limit = self.config.requests_per_window;

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));
        entry.roll(now, window);

        let allowed = entry.count < limit;
        if allowed {
            entry.count += 1;
        }

        RateLimitResult {
            allowed,
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_time: entry.time_until_reset(now, window),
        }
    }

    /// Drop counters whose window has elapsed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window_duration;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < window);
        before.saturating_sub(self.entries.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

/// Client key: first forwarded hop, then `x-real-ip`, then the peer address.
pub fn extract_ip_key(request: &Request) -> String {
    let headers = request.headers();
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return format!("ip:{}", ip);
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return format!("ip:{}", ip);
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

fn apply_headers(response: &mut Response, result: &RateLimitResult) {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, num_to_header_value(result.limit));
    headers.insert(REMAINING_HEADER, num_to_header_value(result.remaining));
    headers.insert(
        RESET_HEADER,
        num_to_header_value(result.reset_time.as_secs()),
    );
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let key = extract_ip_key(&request);
    let result = limiter.check_rate_limit(&key);

    let mut response = if result.allowed {
        next.run(request).await
    } else {
        warn!(key = %key, "rate limit exceeded");
        counter!("stockroom.rate_limit.rejected", 1);
        ServiceError::RateLimitExceeded.into_response()
    };

    if limiter.config().enable_headers {
        apply_headers(&mut response, &result);
    }
    response
}

pub async fn start_cleanup_task(rate_limiter: RateLimiter, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        interval_timer.tick().await;
        let removed = rate_limiter.cleanup_expired();
        debug!(removed, "rate limiter cleanup completed");
    }
}
