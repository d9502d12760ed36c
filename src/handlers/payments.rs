//! Customer payment routes.

use std::collections::HashMap;

use axum::extract::{Form, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::AppState;

fn form_to_json(form: &HashMap<String, String>) -> Value {
    let mut map = Map::new();
    for (k, v) in form {
        map.insert(k.clone(), Value::String(v.clone()));
    }
    Value::Object(map)
}

pub async fn add(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let _: Option<Value> = sqlx::query_scalar("SELECT sp_add_payment($1::jsonb)")
        .bind(form_to_json(&form))
        .fetch_one(&*pool)
        .await?;
    Ok(Json(json!({ "result": true })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let rows: Option<Value> = sqlx::query_scalar("SELECT sp_payment_history($1, $2)")
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&*pool)
        .await?;
    Ok(Json(rows.unwrap_or_else(|| Value::Array(Vec::new()))))
}
