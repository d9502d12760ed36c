//! Route-level credential enforcement and tenant binding.
//!
//! Protected routes declare a `required_level`; the guard verifies the
//! bearer credential, resolves the principal's tenant codename through
//! the master catalog, and runs the rest of the request inside that
//! tenant's task-local binding. The tenant always comes from the
//! credential, never from the request body or URL.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::auth::Principal;
use crate::error::AppError;
use crate::tenant;
use crate::AppState;

#[derive(Clone)]
pub struct LevelGuard {
    pub state: AppState,
    pub required_level: u8,
}

impl LevelGuard {
    pub fn new(state: AppState, required_level: u8) -> Self {
        Self {
            state,
            required_level,
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Gateway auth middleware: verify, bind tenant, dispatch.
pub async fn require_level(
    State(guard): State<LevelGuard>,
    mut req: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthenticated("missing bearer credential".to_string()))?;

    let principal = guard
        .state
        .credentials
        .verify_access(token, guard.required_level)?;

    // codename -> db_name goes through the catalog; a forged tenant claim
    // that is not listed there never reaches the pool registry.
    let gallery = guard.state.catalog.resolve(&principal.tenant).await?;

    tracing::debug!(
        user = %principal.username,
        tenant = %principal.tenant,
        "authenticated request"
    );

    let context = format!("{} {}", req.method(), req.uri().path());
    req.extensions_mut().insert(principal);

    let response = tenant::with_tenant(gallery.db_name, async {
        let response = next.run(req).await;
        if response.status().is_server_error() {
            // Sink runs while the tenant binding is still live, so the
            // row lands in the right tenant's log table.
            crate::services::log_sink::report_internal_error(
                &guard.state.pools,
                &guard.state.mailer,
                &context,
                &format!("request failed with status {}", response.status()),
            )
            .await;
        }
        response
    })
    .await;
    Ok(response)
}

/// Public store-backed routes run under a fixed binding: the main
/// database for newsletter/website traffic, the configured sales tenant
/// for online orders.
#[derive(Clone)]
pub struct FixedTenant {
    pub db_name: String,
}

pub async fn bind_fixed_tenant(
    State(fixed): State<FixedTenant>,
    req: Request<Body>,
    next: Next<Body>,
) -> Response {
    tenant::with_tenant(fixed.db_name, next.run(req)).await
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("missing principal".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }
}
