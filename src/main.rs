mod cli;

use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use cli::{BackupCommands, Cli, Commands};
use pardaaf_core::config::Config;
use pardaaf_core::services::jobs;
use pardaaf_core::{create_app, AppState};

/// OpenAPI Schema for the Pardaaf Core API
#[derive(OpenApi)]
#[openapi(
    paths(
        pardaaf_core::handlers::health,
    ),
    components(
        schemas(
            pardaaf_core::health::HealthResponse,
            pardaaf_core::health::DependencyStatus,
        )
    ),
    info(
        title = "Pardaaf Core API",
        version = "0.1.0",
        description = "Multi-tenant back-office API for the Pardaaf curtain galleries",
        contact(name = "Pardaaf Team")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Cli::parse();
    let config = Config::from_env()?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Worker => worker(config).await,
        Commands::Backup(BackupCommands::Run { cadence }) => {
            cli::handle_backup_run(&config, &cadence).await
        }
        Commands::Backup(BackupCommands::Cleanup { cadence }) => {
            cli::handle_backup_cleanup(&config, &cadence).await
        }
        Commands::Config => cli::handle_config_validate(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let port = config.server_port;
    let state = AppState::from_config(config).await?;
    let pools = state.pools.clone();

    // Master catalog schema; tenant databases are managed out-of-band.
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("./migrations")).await?;
    migrator.run(&*pools.main_pool()?).await?;
    tracing::info!("master database migrations completed");

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pools.close_all().await;
    Ok(())
}

async fn worker(config: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let scheduler = jobs::build_scheduler(state.job_context()).await?;

    scheduler.start().await?;
    for (name, status) in scheduler.get_job_status().await {
        tracing::info!(job = %name, next_run = ?status.next_run, "job scheduled");
    }

    shutdown_signal().await;
    scheduler.stop().await?;
    state.pools.close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutdown signal received");
}
