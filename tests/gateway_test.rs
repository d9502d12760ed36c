use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use pardaaf_core::auth::{Principal, LEVEL_ADMIN, LEVEL_READ};
use pardaaf_core::config::Config;
use pardaaf_core::{create_app, AppState};

fn test_config() -> Config {
    Config {
        server_port: 0,
        request_timeout_secs: 30,
        db_host: "127.0.0.1".to_string(),
        // Nothing listens here; protected routes must fail before any
        // database work unless auth passes.
        db_port: 59999,
        db_user: "pardaaf".to_string(),
        db_password: "pw".to_string(),
        main_db: "pardaaf_main".to_string(),
        pool_min_connections: 1,
        pool_max_connections: 10,
        pool_acquire_timeout_secs: 1,
        redis_url: "redis://127.0.0.1:59998/1".to_string(),
        jwt_secret: "test-secret".to_string(),
        blob_account_id: "acct".to_string(),
        blob_access_key_id: "key".to_string(),
        blob_secret_access_key: "secret".to_string(),
        blob_bucket: "curtaindb".to_string(),
        blob_public_base: "https://cdn.example.com".to_string(),
        // Nothing listens here either; the error sink's mail attempt must
        // fail fast instead of hanging the request.
        smtp_host: "127.0.0.1".to_string(),
        smtp_user: "user".to_string(),
        smtp_password: "pw".to_string(),
        mail_from: "Pardaaf <no-reply@example.com>".to_string(),
        admin_email: "admin@example.com".to_string(),
        telegram_bot_token: "token".to_string(),
        telegram_api_base: "https://api.telegram.org".to_string(),
        fx_app_id: "app".to_string(),
        fx_api_base: "https://openexchangerates.org/api".to_string(),
        sales_tenant: "sales".to_string(),
        website_redirect_url: "https://example.com/thanks".to_string(),
        site_base_url: "https://api.example.com".to_string(),
        rclone_remote: "backups".to_string(),
    }
}

async fn test_state() -> AppState {
    AppState::from_config(test_config())
        .await
        .expect("state builds without live services")
}

fn access_token(state: &AppState, level: u8) -> String {
    let principal = Principal {
        user_id: 1,
        username: "basir".to_string(),
        level,
        tenant: "gallerya".to_string(),
    };
    state
        .credentials
        .issue_pair(&principal)
        .unwrap()
        .access_token
}

#[tokio::test]
async fn protected_route_without_credential_is_401() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/is-token-valid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_credential_is_401() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/is-token-valid")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn read_level_token_cannot_reach_admin_route() {
    let state = test_state().await;
    let token = access_token(&state, LEVEL_READ);
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/users-list-get")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn read_level_token_cannot_write_inventory() {
    let state = test_state().await;
    let token = access_token(&state, LEVEL_READ);
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/add-or-edit-product")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(Body::from("name=Velvet"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_token_passes_the_guard() {
    // With no database behind the gateway the request dies resolving the
    // tenant catalog, not in the credential guard: a 5xx, not 401/403.
    let state = test_state().await;
    let token = access_token(&state, LEVEL_ADMIN);
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/is-token-valid")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    assert!(status.is_server_error(), "expected 5xx, got {}", status);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/no-such-route")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_with_invalid_codename_is_400() {
    let app = create_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"tenant": "Not A Codename!", "username": "basir", "password": "pw"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
