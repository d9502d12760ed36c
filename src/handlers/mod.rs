pub mod auth;
pub mod bills;
pub mod entities;
pub mod payments;
pub mod print_jobs;
pub mod public;
pub mod sync;
pub mod telegram;

use axum::{extract::State, Json};

use crate::health::HealthResponse;
use crate::AppState;

/// Service health with dependency detail
///
/// Checks the master database and Redis.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health report", body = HealthResponse),
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.health.check_all().await)
}
