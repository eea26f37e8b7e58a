use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::LimitsConfig;
use crate::state::AppState;

/// Requests one client may still make, refilled continuously.
struct Bucket {
    available: f64,
    touched: Instant,
}

impl Bucket {
    fn take(&mut self, now: Instant, burst: f64, per_sec: f64) -> bool {
        let earned = now.duration_since(self.touched).as_secs_f64() * per_sec;
        self.available = (self.available + earned).min(burst);
        self.touched = now;
        if self.available < 1.0 {
            return false;
        }
        self.available -= 1.0;
        true
    }
}

/// Per-IP token buckets guarding the `/api` surface: up to `burst` requests
/// at once, refilled at `per_sec`.
pub struct ApiRateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    burst: f64,
    per_sec: f64,
}

impl ApiRateLimiter {
    pub fn new(burst: f64, per_sec: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            burst,
            per_sec,
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.api_rate_limit_burst as f64, limits.api_rate_limit_per_sec)
    }

    /// Spend one request for `ip`. `false` means the client is over its limit.
    pub async fn try_acquire(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(ip)
            .or_insert(Bucket {
                available: self.burst,
                touched: now,
            })
            .take(now, self.burst, self.per_sec)
    }

    /// Forget clients idle for at least `max_age`.
    pub async fn forget_idle(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .await
            .retain(|_, b| now.duration_since(b.touched) < max_age);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

/// Client address from `ConnectInfo`, falling back to loopback when the
/// router is served without connect info (as in tests).
pub fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Axum middleware applying the per-IP limit to `/api` routes.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if !state.rate_limiter.try_acquire(ip).await {
        tracing::warn!(%ip, path = %request.uri().path(), "Rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "Too many requests, please try again later." })),
        )
            .into_response();
    }
    next.run(request).await
}

/// Periodically drop idle buckets so the map does not grow without bound.
pub fn spawn_cleanup(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            state.rate_limiter.forget_idle(every).await;
        }
    });
}
