use serde::Deserialize;

use workforce_core::model::AgentType;

/// JWT secret used when nothing is configured. Rejected in production.
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-replace-in-production";

/// Top-level gateway configuration, loaded from `workforce.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub web_root: String,
    /// Allowed CORS origin for the dashboard.
    pub frontend_url: String,
    pub auth: AuthFileConfig,
    pub backend: BackendConfig,
    pub limits: LimitsConfig,
    pub local: LocalConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            web_root: "web".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            auth: AuthFileConfig::default(),
            backend: BackendConfig::default(),
            limits: LimitsConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "test" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

/// Token issuing and verification settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub environment: Environment,
    /// Accept the literal `demo-token` as an implicit demo identity.
    /// Never honoured when `environment` is production.
    pub allow_demo_token: bool,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_ttl_secs: 24 * 60 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            environment: Environment::Development,
            allow_demo_token: true,
        }
    }
}

/// Where agent, task, and metrics requests are served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// In-process, in-memory workforce with its own push hub.
    Local,
    /// Reverse proxy to a remote agent backend.
    Proxy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    pub url: String,
    pub health_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Local,
            url: "http://localhost:8001".to_string(),
            health_timeout_ms: 3000,
        }
    }
}

impl BackendConfig {
    /// WebSocket base URL of the backend (`http` -> `ws`, `https` -> `wss`).
    pub fn ws_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }
}

/// Infrastructure limits (rate limits, connection caps, list sizes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// API rate limit: max burst tokens per IP.
    pub api_rate_limit_burst: usize,
    /// API rate limit: token refill rate (requests per second) per IP.
    pub api_rate_limit_per_sec: f64,
    pub max_ws_connections: usize,
    pub broadcast_capacity: usize,
    pub max_body_bytes: usize,
    pub default_task_limit: usize,
    pub max_task_limit: usize,
    /// Number of recent tasks included in the `init` snapshot.
    pub init_task_limit: usize,
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            api_rate_limit_burst: 500,
            api_rate_limit_per_sec: 500.0 / 900.0, // 500 per 15 minutes
            max_ws_connections: 200,
            broadcast_capacity: 1024,
            max_body_bytes: 10 * 1024 * 1024,
            default_task_limit: 50,
            max_task_limit: 1000,
            init_task_limit: 20,
            request_timeout_secs: 30,
        }
    }
}

/// Settings for the in-memory workforce (`backend.mode = "local"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub allowed_agent_types: Vec<AgentType>,
    /// Delay between submission and the task entering `running`.
    pub execution_delay_ms: u64,
    pub max_stored_tasks: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            allowed_agent_types: AgentType::ALL.to_vec(),
            execution_delay_ms: 50,
            max_stored_tasks: 5000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

impl GatewayConfig {
    /// Validate configuration. Warnings are logged; hard errors are returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError(format!(
                "listen_addr {} is not a valid socket address",
                self.listen_addr
            )));
        }

        if self.auth.environment == Environment::Production {
            if self.auth.allow_demo_token {
                return Err(ConfigError(
                    "auth.allow_demo_token must be false in production".to_string(),
                ));
            }
            if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
                return Err(ConfigError(
                    "auth.jwt_secret must be set in production".to_string(),
                ));
            }
        } else if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("Using the default JWT secret; set WORKFORCE_JWT_SECRET outside development");
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError("auth.jwt_secret must not be empty".to_string()));
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            return Err(ConfigError("token lifetimes must be > 0".to_string()));
        }

        if self.limits.api_rate_limit_burst == 0 {
            return Err(ConfigError("limits.api_rate_limit_burst must be > 0".to_string()));
        }
        if self.limits.api_rate_limit_per_sec <= 0.0 {
            return Err(ConfigError("limits.api_rate_limit_per_sec must be > 0".to_string()));
        }
        if self.limits.max_ws_connections == 0 {
            return Err(ConfigError("limits.max_ws_connections must be > 0".to_string()));
        }
        if self.limits.broadcast_capacity == 0 {
            return Err(ConfigError("limits.broadcast_capacity must be > 0".to_string()));
        }
        if self.limits.max_body_bytes == 0 {
            return Err(ConfigError("limits.max_body_bytes must be > 0".to_string()));
        }
        if self.limits.request_timeout_secs == 0 {
            return Err(ConfigError("limits.request_timeout_secs must be > 0".to_string()));
        }
        if self.limits.default_task_limit == 0
            || self.limits.default_task_limit > self.limits.max_task_limit
        {
            return Err(ConfigError(
                "limits.default_task_limit must be in 1..=max_task_limit".to_string(),
            ));
        }

        if self.backend.mode == BackendMode::Proxy
            && !(self.backend.url.starts_with("http://") || self.backend.url.starts_with("https://"))
        {
            return Err(ConfigError(format!(
                "backend.url {} must be an http(s) URL",
                self.backend.url
            )));
        }
        if self.backend.mode == BackendMode::Local && self.local.allowed_agent_types.is_empty() {
            tracing::warn!("local.allowed_agent_types is empty; every deploy will be rejected");
        }

        Ok(())
    }

    /// Load config from `workforce.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("workforce.toml") {
            Ok(content) => match toml::from_str::<GatewayConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from workforce.toml");
                    if cfg.auth.jwt_secret != DEFAULT_JWT_SECRET {
                        tracing::warn!(
                            "jwt_secret is set in config file; use WORKFORCE_JWT_SECRET in production"
                        );
                    }
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse workforce.toml: {e}, using defaults");
                    GatewayConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No workforce.toml found, using defaults");
                GatewayConfig::default()
            },
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(addr) = var("WORKFORCE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(root) = var("WORKFORCE_WEB_ROOT") {
            self.web_root = root;
        }
        if let Some(url) = var("WORKFORCE_FRONTEND_URL") {
            self.frontend_url = url;
        }
        if let Some(secret) = var("WORKFORCE_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(env) = var("WORKFORCE_ENV") {
            match Environment::parse(&env) {
                Some(parsed) => self.auth.environment = parsed,
                None => tracing::warn!(value = %env, "Ignoring unknown WORKFORCE_ENV"),
            }
        }
        if let Some(url) = var("WORKFORCE_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Some(mode) = var("WORKFORCE_BACKEND_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "local" => self.backend.mode = BackendMode::Local,
                "proxy" => self.backend.mode = BackendMode::Proxy,
                _ => tracing::warn!(value = %mode, "Ignoring unknown WORKFORCE_BACKEND_MODE"),
            }
        }
        if let Some(val) = var("WORKFORCE_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
    }
}
