//! Bulk list endpoints the mobile client uses to stay in sync.

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::error::AppError;
use crate::AppState;

pub async fn check_sync(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let result: Option<Value> = sqlx::query_scalar("SELECT sp_check_sync($1::jsonb)")
        .bind(payload)
        .fetch_one(&*pool)
        .await?;
    Ok(Json(result.unwrap_or_else(|| Value::Object(Default::default()))))
}

pub async fn get_lists(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let result: Option<Value> = sqlx::query_scalar("SELECT sp_get_lists()")
        .fetch_one(&*pool)
        .await?;
    Ok(Json(result.unwrap_or_else(|| Value::Object(Default::default()))))
}

pub async fn get_inventory_lists(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let result: Option<Value> = sqlx::query_scalar("SELECT sp_get_inventory_lists()")
        .fetch_one(&*pool)
        .await?;
    Ok(Json(result.unwrap_or_else(|| Value::Object(Default::default()))))
}
