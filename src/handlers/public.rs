//! Unauthenticated website routes: contact form, online orders,
//! newsletter lifecycle, and the public FX feed. Store-backed routes run
//! under a fixed tenant binding applied in the router.

use axum::extract::{Query, State};
use axum::response::{Html, Redirect};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::fx;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub message: String,
}

/// Website contact form; replies with a redirect back to the site.
pub async fn submit_request(
    State(state): State<AppState>,
    Query(form): Query<ContactForm>,
) -> Result<Redirect, AppError> {
    let pool = state.pools.current_pool()?;
    sqlx::query(
        "INSERT INTO website_requests (name, phone, message, created_at)
         VALUES ($1, $2, $3, NOW())",
    )
    .bind(&form.name)
    .bind(&form.phone)
    .bind(&form.message)
    .execute(&*pool)
    .await?;

    Ok(Redirect::to(&state.config.website_redirect_url))
}

/// Online order from the website, recorded against the configured sales
/// tenant, resolved through the catalog like every tenant lookup.
pub async fn add_online_order(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let gallery = state.catalog.resolve(&state.config.sales_tenant).await?;
    let pool = state.pools.pool_for(&gallery.db_name)?;
    let _: Option<Value> = sqlx::query_scalar("SELECT sp_add_online_order($1::jsonb)")
        .bind(payload)
        .fetch_one(&*pool)
        .await?;
    Ok(Json(json!({ "result": true })))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub email: String,
}

pub async fn subscribe_newsletter(
    State(state): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> Result<Json<Value>, AppError> {
    let email = query.email.trim().to_lowercase();
    if !email.contains('@') || email.len() < 5 {
        return Err(AppError::BadRequest("invalid email address".to_string()));
    }

    let token = Uuid::new_v4().to_string();
    let pool = state.pools.current_pool()?;
    sqlx::query(
        "INSERT INTO newsletter_subscribers (email, token, confirmed, created_at)
         VALUES ($1, $2, false, NOW())
         ON CONFLICT (email) DO UPDATE SET token = $2",
    )
    .bind(&email)
    .bind(&token)
    .execute(&*pool)
    .await?;

    let link = format!(
        "{}/confirm-email-newsletter?token={}",
        state.config.site_base_url.trim_end_matches('/'),
        token
    );
    let body = format!(
        "Salaam,\n\nPlease confirm your Pardaaf newsletter subscription:\n{}\n",
        link
    );
    if let Err(e) = state
        .mailer
        .send(&email, "Confirm your subscription", body)
        .await
    {
        tracing::error!("newsletter confirmation mail failed: {}", e);
        return Err(AppError::Unavailable("could not send email".to_string()));
    }

    Ok(Json(json!({ "result": true })))
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

pub async fn confirm_newsletter(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Html<String>, AppError> {
    let pool = state.pools.current_pool()?;
    let updated = sqlx::query(
        "UPDATE newsletter_subscribers SET confirmed = true WHERE token = $1",
    )
    .bind(&query.token)
    .execute(&*pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown confirmation token".to_string()));
    }
    Ok(Html(
        "<html><body><h1>Subscription confirmed</h1>\
         <p>You will now receive the Pardaaf newsletter.</p></body></html>"
            .to_string(),
    ))
}

pub async fn unsubscribe_newsletter(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Html<String>, AppError> {
    let pool = state.pools.current_pool()?;
    sqlx::query("DELETE FROM newsletter_subscribers WHERE token = $1")
        .bind(&query.token)
        .execute(&*pool)
        .await?;

    Ok(Html(
        "<html><body><h1>Unsubscribed</h1>\
         <p>You will no longer receive the Pardaaf newsletter.</p></body></html>"
            .to_string(),
    ))
}

pub async fn fx_latest(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let pool = state.pools.main_pool()?;
    let rates = fx::latest_rates(&pool).await?;
    Ok(Json(json!({ "base": fx::BASE_CURRENCY, "rates": rates })))
}
