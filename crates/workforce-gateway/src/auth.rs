use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::{AuthFileConfig, Environment};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::PublicUser;

/// Literal token accepted as the demo identity outside production.
pub const DEMO_TOKEN: &str = "demo-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims. Refresh tokens only carry `sub`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, inserted into request extensions by the bearer
/// middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    pub org: Option<String>,
    pub role: Option<String>,
}

impl Identity {
    fn demo() -> Self {
        Self {
            id: "demo-user".to_string(),
            email: None,
            org: Some("demo-org".to_string()),
            role: Some("admin".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing or invalid Authorization header")]
    MissingCredentials,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Token could not be issued: {0}")]
    Issue(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Issue(m) => AppError::Internal(m),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

/// Token issuing and verification, built from `AuthFileConfig`.
#[derive(Clone)]
pub struct AuthConfig {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    demo_token_enabled: bool,
}

impl AuthConfig {
    pub fn from_config(cfg: &AuthFileConfig) -> Self {
        let secret = cfg.jwt_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl_secs: i64::try_from(cfg.access_ttl_secs).unwrap_or(i64::MAX / 2),
            refresh_ttl_secs: i64::try_from(cfg.refresh_ttl_secs).unwrap_or(i64::MAX / 2),
            demo_token_enabled: cfg.allow_demo_token && cfg.environment != Environment::Production,
        }
    }

    pub fn demo_token_enabled(&self) -> bool {
        self.demo_token_enabled
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Mint a short-lived access token and a longer-lived refresh token.
    pub fn issue_pair(&self, user: &PublicUser) -> Result<TokenPair, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let access = Claims {
            sub: user.id.clone(),
            email: Some(user.email.clone()),
            org: Some(user.org.clone()),
            role: Some(user.role.clone()),
            kind: TokenKind::Access,
            iat: now,
            exp: now.saturating_add(self.access_ttl_secs),
        };
        let refresh = Claims {
            sub: user.id.clone(),
            email: None,
            org: None,
            role: None,
            kind: TokenKind::Refresh,
            iat: now,
            exp: now.saturating_add(self.refresh_ttl_secs),
        };
        Ok(TokenPair {
            access_token: self.encode_claims(&access)?,
            refresh_token: self.encode_claims(&refresh)?,
        })
    }

    /// Verify signature, expiry, and token kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        if data.claims.kind != kind {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    /// Resolve a bearer token to an identity: a valid access JWT, or the demo
    /// literal when enabled.
    pub fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        match self.verify(token, TokenKind::Access) {
            Ok(claims) => Ok(Identity {
                id: claims.sub,
                email: claims.email,
                org: claims.org,
                role: claims.role,
            }),
            Err(_) if self.demo_token_enabled && token == DEMO_TOKEN => Ok(Identity::demo()),
            Err(e) => Err(e),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum middleware that requires a valid bearer token and attaches the
/// caller's `Identity` to the request. CORS preflights pass through.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let token = bearer_token(request.headers()).ok_or(AuthError::MissingCredentials)?;
    let identity = state.auth.authenticate(token)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
