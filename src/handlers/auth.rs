//! Login, refresh, and account credential routes.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{password_digest, Principal};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub tenant: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub username: String,
    pub level: u8,
}

/// The one route that reads the tenant from the request body; the
/// codename goes through the master catalog before anything touches a
/// pool.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let gallery = state.catalog.resolve(&payload.tenant).await?;
    let pool = state.pools.pool_for(&gallery.db_name)?;

    let digest = password_digest(&payload.password);
    let row: Option<(i64, String, i16)> = sqlx::query_as(
        "SELECT id, username, level FROM users WHERE username = $1 AND password_hash = $2",
    )
    .bind(&payload.username)
    .bind(&digest)
    .fetch_optional(&*pool)
    .await?;

    let (user_id, username, level) = row.ok_or_else(|| {
        AppError::Unauthenticated("invalid username or password".to_string())
    })?;

    let principal = Principal {
        user_id,
        username,
        level: level as u8,
        tenant: gallery.codename,
    };
    let pair = state.credentials.issue_pair(&principal)?;

    tracing::info!(user = %principal.username, tenant = %principal.tenant, "login");
    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        username: principal.username,
        level: principal.level,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Mint a fresh pair from a refresh credential. User attributes (level,
/// display name) are re-read from the tenant database, so role changes
/// land at refresh time.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let stale = state.credentials.verify_refresh(&payload.refresh_token)?;

    let gallery = state.catalog.resolve(&stale.tenant).await?;
    let pool = state.pools.pool_for(&gallery.db_name)?;

    let row: Option<(String, i16)> =
        sqlx::query_as("SELECT username, level FROM users WHERE id = $1")
            .bind(stale.user_id)
            .fetch_optional(&*pool)
            .await?;

    let (username, level) = row.ok_or_else(|| {
        AppError::Unauthenticated("account no longer exists".to_string())
    })?;

    let principal = Principal {
        user_id: stale.user_id,
        username,
        level: level as u8,
        tenant: gallery.codename,
    };
    let pair = state.credentials.issue_pair(&principal)?;

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        username: principal.username,
        level: principal.level,
    }))
}

/// Reaching the handler at all means the guard accepted the credential.
pub async fn is_token_valid() -> Json<Value> {
    Json(json!({ "result": true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    if payload.new_password.len() < 6 {
        return Err(AppError::BadRequest(
            "new password must be at least 6 characters".to_string(),
        ));
    }

    let pool = state.pools.current_pool()?;
    let updated = sqlx::query(
        "UPDATE users SET password_hash = $1 WHERE id = $2 AND password_hash = $3",
    )
    .bind(password_digest(&payload.new_password))
    .bind(principal.user_id)
    .bind(password_digest(&payload.old_password))
    .execute(&*pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::BadRequest(
            "old password does not match".to_string(),
        ));
    }
    Ok(Json(json!({ "result": true })))
}
