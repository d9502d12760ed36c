//! Bill routes. Status updates are the one place a CRUD write has a side
//! effect the core owns: moving into `ready` pushes bot notifications.

use std::collections::HashMap;

use axum::extract::{Form, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::services::notifications;
use crate::AppState;

pub const BILL_STATUSES: [&str; 5] = ["cut", "pending", "with_tailor", "ready", "delivered"];

fn form_to_json(form: &HashMap<String, String>) -> Value {
    let mut map = Map::new();
    for (k, v) in form {
        map.insert(k.clone(), Value::String(v.clone()));
    }
    Value::Object(map)
}

pub async fn add_or_edit(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let code: String = sqlx::query_scalar("SELECT sp_save_bill($1::jsonb)")
        .bind(form_to_json(&form))
        .fetch_one(&*pool)
        .await?;
    Ok(Json(json!({ "result": true, "code": code })))
}

#[derive(Debug, Deserialize)]
pub struct BillListQuery {
    pub status: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<BillListQuery>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let rows: Option<Value> = sqlx::query_scalar("SELECT sp_list_bills($1)")
        .bind(query.status)
        .fetch_one(&*pool)
        .await?;
    Ok(Json(rows.unwrap_or_else(|| Value::Array(Vec::new()))))
}

#[derive(Debug, Deserialize)]
pub struct BillQuery {
    pub code: String,
}

pub async fn get_one(
    State(state): State<AppState>,
    Query(query): Query<BillQuery>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let row: Option<Value> = sqlx::query_scalar("SELECT sp_get_bill($1)")
        .bind(&query.code)
        .fetch_one(&*pool)
        .await?;
    match row {
        Some(Value::Null) | None => {
            Err(AppError::NotFound(format!("bill {} not found", query.code)))
        }
        Some(value) => Ok(Json(value)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub code: String,
    pub status: String,
}

pub async fn update_status(
    State(state): State<AppState>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    if !BILL_STATUSES.contains(&payload.status.as_str()) {
        return Err(AppError::BadRequest(format!(
            "invalid bill status: {}",
            payload.status
        )));
    }

    let pool = state.pools.current_pool()?;
    let previous: Option<String> =
        sqlx::query_scalar("SELECT sp_update_bill_status($1, $2)")
            .bind(&payload.code)
            .bind(&payload.status)
            .fetch_one(&*pool)
            .await?;

    let previous = previous
        .ok_or_else(|| AppError::NotFound(format!("bill {} not found", payload.code)))?;

    if notifications::should_notify(&previous, &payload.status) {
        let notified =
            notifications::flush_bill_notifications(&pool, &state.telegram, &payload.code)
                .await?;
        if notified > 0 {
            tracing::info!(bill = %payload.code, notified = notified, "bill ready pushes sent");
        }
    }

    Ok(Json(json!({ "result": true, "previousStatus": previous })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTailorRequest {
    pub code: String,
    pub tailor_id: String,
}

pub async fn update_tailor(
    State(state): State<AppState>,
    Json(payload): Json<UpdateTailorRequest>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let updated: Option<bool> = sqlx::query_scalar("SELECT sp_update_bill_tailor($1, $2)")
        .bind(&payload.code)
        .bind(&payload.tailor_id)
        .fetch_one(&*pool)
        .await?;

    if updated != Some(true) {
        return Err(AppError::NotFound(format!(
            "bill {} not found",
            payload.code
        )));
    }
    Ok(Json(json!({ "result": true })))
}

pub async fn add_payment(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let _: Option<Value> = sqlx::query_scalar("SELECT sp_add_bill_payment($1::jsonb)")
        .bind(form_to_json(&form))
        .fetch_one(&*pool)
        .await?;
    Ok(Json(json!({ "result": true })))
}
