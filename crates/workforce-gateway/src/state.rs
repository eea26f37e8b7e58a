use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::auth::AuthConfig;
use crate::config::GatewayConfig;
use crate::hub::PushHub;
use crate::rate_limit::ApiRateLimiter;
use crate::users::UserDirectory;
use crate::workforce::Workforce;

pub type SharedWorkforce = Arc<RwLock<Workforce>>;
pub type SharedUsers = Arc<RwLock<UserDirectory>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub auth: AuthConfig,
    pub users: SharedUsers,
    /// Serves agent/task/metrics routes in local mode; idle in proxy mode.
    pub workforce: SharedWorkforce,
    /// Outbound client for proxying and backend health probes.
    pub http: reqwest::Client,
    pub rate_limiter: Arc<ApiRateLimiter>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let auth = AuthConfig::from_config(&config.auth);
        let hub = PushHub::new(config.limits.broadcast_capacity);
        let workforce = Workforce::new(&config.local, hub);
        let rate_limiter = ApiRateLimiter::from_limits(&config.limits);
        Self {
            config: Arc::new(config),
            auth,
            users: Arc::new(RwLock::new(UserDirectory::new())),
            workforce: Arc::new(RwLock::new(workforce)),
            http: reqwest::Client::new(),
            rate_limiter: Arc::new(rate_limiter),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Holds one slot of the WebSocket connection budget; released on drop.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    /// Take a slot if fewer than `max` are in use.
    pub fn try_acquire(counter: Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Self { counter })
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
