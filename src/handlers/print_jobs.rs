//! Print-queue routes: clients submit small binary payloads, the
//! in-store printer agent polls with a since-cursor and acks what it has
//! printed.

use axum::extract::{Query, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Principal;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPrintJobRequest {
    pub file_name: String,
    /// Base64-encoded payload.
    pub data: String,
}

pub async fn add(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<AddPrintJobRequest>,
) -> Result<Json<Value>, AppError> {
    if payload.file_name.is_empty() {
        return Err(AppError::BadRequest("file name is required".to_string()));
    }
    let bytes = BASE64
        .decode(payload.data.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("invalid print payload: {}", e)))?;

    let job_id = state
        .print_queue
        .enqueue(&principal.tenant, &payload.file_name, &bytes)
        .await?;

    Ok(Json(json!({ "result": true, "jobId": job_id })))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub since: Option<i64>,
}

pub async fn poll(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<PollQuery>,
) -> Result<Json<Value>, AppError> {
    let jobs = state
        .print_queue
        .poll(&principal.tenant, query.since.unwrap_or(0))
        .await?;
    Ok(Json(json!({ "jobs": jobs })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPrintedRequest {
    pub job_id: i64,
}

pub async fn mark_printed(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<MarkPrintedRequest>,
) -> Result<Json<Value>, AppError> {
    state
        .print_queue
        .ack(&principal.tenant, payload.job_id)
        .await?;
    Ok(Json(json!({ "result": true })))
}
