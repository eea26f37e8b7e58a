use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::{TokenKind, TokenPair};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::{PublicUser, UserError};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "orgName")]
    pub org_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: PublicUser,
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

fn credentials(email: Option<String>, password: Option<String>) -> Result<(String, String), AppError> {
    match (required(email), required(password)) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(AppError::BadRequest("Email and password required".to_string())),
    }
}

fn respond(state: &AppState, user: PublicUser) -> Result<AuthResponse, AppError> {
    let tokens = state.auth.issue_pair(&user)?;
    Ok(AuthResponse { tokens, user })
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (email, password) = credentials(body.email, body.password)?;
    let user = state
        .users
        .read()
        .await
        .authenticate(&email, &password)
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(respond(&state, user)?))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let (email, password) = credentials(body.email, body.password)?;
    let user = state
        .users
        .write()
        .await
        .register(&email, &password, body.org_name.as_deref())
        .map_err(|e| match e {
            UserError::EmailTaken => AppError::Conflict(e.to_string()),
        })?;
    tracing::info!(user_id = %user.id, org = %user.org, "User registered");
    Ok((StatusCode::CREATED, Json(respond(&state, user)?)))
}

/// POST /api/auth/demo
pub async fn demo(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let user = state.users.write().await.ensure_demo_user();
    Ok(Json(respond(&state, user)?))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let token = required(body.refresh_token)
        .ok_or_else(|| AppError::BadRequest("Refresh token required".to_string()))?;
    let invalid = || AppError::Unauthorized("Invalid refresh token".to_string());

    let claims = state
        .auth
        .verify(&token, TokenKind::Refresh)
        .map_err(|_| invalid())?;
    let user = state.users.read().await.get(&claims.sub).ok_or_else(invalid)?;
    Ok(Json(state.auth.issue_pair(&user)?))
}
