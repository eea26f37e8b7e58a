use std::time::Duration;

use crate::backoff::ReconnectPolicy;
use crate::notifications::DEFAULT_NOTIFICATION_TTL;

/// Timers and endpoints for a sync session.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Gateway base URL, e.g. `http://localhost:3001`.
    pub server_url: String,
    pub reconnect: ReconnectPolicy,
    /// Interval between `ping` frames while the push channel is open.
    pub heartbeat_interval: Duration,
    /// Interval between reconciliation polls of `/api/tasks`.
    pub poll_interval: Duration,
    pub notification_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3001".to_string(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
        }
    }
}

impl SyncConfig {
    /// Defaults plus `WORKFORCE_SERVER_URL` and `WORKFORCE_POLL_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Apply overrides from a variable lookup. Empty and unparsable values
    /// are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("WORKFORCE_SERVER_URL") {
            self.server_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = var("WORKFORCE_POLL_INTERVAL_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %raw, "Ignoring invalid WORKFORCE_POLL_INTERVAL_MS"),
            }
        }
    }

    /// REST base: `<server_url>/api`.
    pub fn api_base_url(&self) -> String {
        format!("{}/api", self.server_url.trim_end_matches('/'))
    }

    /// WebSocket base derived from `server_url` (`http` -> `ws`,
    /// `https` -> `wss`).
    pub fn ws_base_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }
}
