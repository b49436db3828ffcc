//! Fixed-window request limiter keyed by client IP.
//!
//! Each client gets `limit` requests per window. The window starts with the
//! client's first request and resets once it has elapsed. Forwarding headers
//! are only read when the server is configured to sit behind a proxy.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    used: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
    limit: u32,
    window: Duration,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            limit,
            window,
            trust_proxy: false,
        }
    }

    /// Key clients by `X-Forwarded-For` / `X-Real-IP` when set.
    pub fn trusting_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn check(&self, ip: IpAddr) -> Decision {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(ip).or_insert(Window { opened: now, used: 0 });

        let elapsed = now.saturating_duration_since(entry.opened);
        if elapsed >= self.window {
            *entry = Window { opened: now, used: 0 };
        }

        if entry.used >= self.limit {
            let retry_after = self.window.saturating_sub(now.saturating_duration_since(entry.opened));
            return Decision::Limited { retry_after };
        }
        entry.used += 1;
        Decision::Allowed {
            remaining: self.limit - entry.used,
        }
    }

    /// Drop windows that have already run out.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.opened) < self.window);
        before - windows.len()
    }

    /// The key a request is counted under.
    pub fn client_ip<B>(&self, req: &Request<B>) -> Option<IpAddr> {
        if self.trust_proxy {
            if let Some(ip) = forwarded_ip(req.headers()) {
                return Some(ip);
            }
        }
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip())
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first_hop = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    first_hop.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(ip) = limiter.client_ip(&req) else {
        return next.run(req).await;
    };

    match limiter.check(ip).await {
        Decision::Allowed { remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert("ratelimit-limit", HeaderValue::from(limiter.limit()));
            headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Decision::Limited { retry_after } => {
            warn!(ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
            let body = serde_json::json!({ "error": "Too many requests, please try again later" });
            let secs = retry_after.as_secs().max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, HeaderValue::from(secs))],
                Json(body),
            )
                .into_response()
        }
    }
}
