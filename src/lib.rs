pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod services;
pub mod storage;
pub mod tenant;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Form, Query, State},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::auth::{CredentialService, Principal};
use crate::config::Config;
use crate::db::catalog::Catalog;
use crate::db::{PoolRegistry, PoolSettings};
use crate::handlers::entities::{IdQuery, RemoveRequest};
use crate::health::{HealthChecker, PostgresChecker, RedisChecker};
use crate::middleware::{bind_fixed_tenant, require_level, FixedTenant, LevelGuard};
use crate::services::bot_state::BotStateStore;
use crate::services::fx::RateProviderClient;
use crate::services::images::ImageService;
use crate::services::jobs::JobContext;
use crate::services::mailer::Mailer;
use crate::services::print_queue::PrintQueue;
use crate::services::telegram::TelegramClient;
use crate::storage::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pools: Arc<PoolRegistry>,
    pub catalog: Arc<Catalog>,
    pub credentials: Arc<CredentialService>,
    pub print_queue: PrintQueue,
    pub bot_states: BotStateStore,
    pub telegram: TelegramClient,
    pub images: ImageService,
    pub mailer: Mailer,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let settings = PoolSettings::from_config(&config);
        let pools = Arc::new(PoolRegistry::new(settings, config.main_db.clone()));
        let catalog = Arc::new(Catalog::new(pools.clone()));
        let credentials = Arc::new(CredentialService::new(&config.jwt_secret));
        let print_queue = PrintQueue::new(&config.redis_url)?;
        let bot_states = BotStateStore::new(&config.redis_url)?;
        let telegram = TelegramClient::new(
            config.telegram_api_base.clone(),
            config.telegram_bot_token.clone(),
        );
        let blobs = BlobStore::from_config(&config).await;
        let images = ImageService::new(blobs);
        let mailer = Mailer::from_config(&config)?;
        let health = Arc::new(
            HealthChecker::new()
                .add_checker(Box::new(PostgresChecker::new(pools.main_pool()?)))
                .add_checker(Box::new(RedisChecker::new(config.redis_url.clone()))),
        );

        Ok(Self {
            config,
            pools,
            catalog,
            credentials,
            print_queue,
            bot_states,
            telegram,
            images,
            mailer,
            health,
        })
    }

    /// Dependencies for the scheduler worker's jobs.
    pub fn job_context(&self) -> JobContext {
        JobContext {
            pools: self.pools.clone(),
            catalog: self.catalog.clone(),
            settings: PoolSettings::from_config(&self.config),
            mailer: self.mailer.clone(),
            telegram: self.telegram.clone(),
            fx_client: RateProviderClient::new(
                self.config.fx_api_base.clone(),
                self.config.fx_app_id.clone(),
            ),
            rclone_remote: self.config.rclone_remote.clone(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    // Routes grouped by required level; each group gets one guard layer
    // that verifies the bearer credential and binds the tenant context.
    let mut level1 = Router::new()
        .route("/is-token-valid", post(handlers::auth::is_token_valid))
        .route("/change-password", post(handlers::auth::change_password))
        .route("/payment-history-get", get(handlers::payments::history))
        .route("/check-sync", post(handlers::sync::check_sync))
        .route("/get-lists", post(handlers::sync::get_lists))
        .route("/bill-list-get", get(handlers::bills::list))
        .route("/bill-get", get(handlers::bills::get_one));

    let mut level2 = Router::new()
        .route("/add-or-edit-bill", post(handlers::bills::add_or_edit))
        .route("/update-bill-status", post(handlers::bills::update_status))
        .route("/update-bill-tailor", post(handlers::bills::update_tailor))
        .route("/add-payment-bill", post(handlers::bills::add_payment))
        .route(
            "/get-inventory-lists",
            post(handlers::sync::get_inventory_lists),
        )
        .route("/add-print-job", post(handlers::print_jobs::add))
        .route("/get-print-jobs", get(handlers::print_jobs::poll));

    let mut level3 = Router::new()
        .route("/add-payment", post(handlers::payments::add))
        .route("/mark-printed", post(handlers::print_jobs::mark_printed));

    for desc in handlers::entities::DESCRIPTORS {
        let read = Router::new()
            .route(
                &format!("/{}-list-get", desc.name),
                get(move |state: State<AppState>| handlers::entities::list(desc, state)),
            )
            .route(
                &format!("/{}-get", desc.name),
                get(move |state: State<AppState>, query: Query<IdQuery>| {
                    handlers::entities::get_one(desc, state, query)
                }),
            );
        let write = Router::new()
            .route(
                &format!("/add-or-edit-{}", desc.name),
                post(
                    move |state: State<AppState>,
                          principal: Principal,
                          form: Form<HashMap<String, String>>| {
                        handlers::entities::add_or_edit(desc, state, principal, form)
                    },
                ),
            )
            .route(
                &format!("/remove-{}", desc.name),
                post(move |state: State<AppState>, form: Form<RemoveRequest>| {
                    handlers::entities::remove(desc, state, form)
                }),
            );

        if desc.read_level >= 3 {
            level3 = level3.merge(read);
        } else {
            level1 = level1.merge(read);
        }
        if desc.write_level >= 3 {
            level3 = level3.merge(write);
        } else {
            level2 = level2.merge(write);
        }
    }

    // Public store-backed routes run against the master database.
    let main_bound = Router::new()
        .route("/submit-request", get(handlers::public::submit_request))
        .route(
            "/subscribe-newsletter",
            get(handlers::public::subscribe_newsletter),
        )
        .route(
            "/confirm-email-newsletter",
            get(handlers::public::confirm_newsletter),
        )
        .route(
            "/unsubscribe-newsletter",
            get(handlers::public::unsubscribe_newsletter),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            FixedTenant {
                db_name: state.config.main_db.clone(),
            },
            bind_fixed_tenant,
        ));

    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/login", post(handlers::auth::login))
        .route("/refresh-token", post(handlers::auth::refresh_token))
        .route("/telegram-webhook", post(handlers::telegram::webhook))
        .route("/add-online-order", post(handlers::public::add_online_order))
        .route("/fx/latest", get(handlers::public::fx_latest))
        .merge(main_bound)
        .merge(level1.route_layer(axum::middleware::from_fn_with_state(
            LevelGuard::new(state.clone(), 1),
            require_level,
        )))
        .merge(level2.route_layer(axum::middleware::from_fn_with_state(
            LevelGuard::new(state.clone(), 2),
            require_level,
        )))
        .merge(level3.route_layer(axum::middleware::from_fn_with_state(
            LevelGuard::new(state.clone(), 3),
            require_level,
        )))
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
