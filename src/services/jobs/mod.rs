//! Scheduled jobs and the tenant fan-out they share.
//!
//! A fan-out run binds the main database, reads the catalog, then
//! rebinds the tenant context for each database in turn. One tenant's
//! failure is logged and the run moves on; the main binding is back in
//! place as soon as the inner scope ends.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::db::catalog::Catalog;
use crate::db::{PoolRegistry, PoolSettings};
use crate::services::backup::{self, BackupCadence};
use crate::services::fx::{self, RateProviderClient};
use crate::services::mailer::Mailer;
use crate::services::notifications;
use crate::services::scheduler::{Job, JobScheduler};
use crate::services::telegram::TelegramClient;

type JobError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Default)]
pub struct FanOutReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Run `body` once per tenant database, each under that tenant's
/// task-local binding.
pub async fn fan_out_tenants<F, Fut>(
    databases: Vec<String>,
    job_name: &str,
    mut body: F,
) -> FanOutReport
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut report = FanOutReport::default();
    for db in databases {
        match crate::tenant::with_tenant(db.clone(), body(db.clone())).await {
            Ok(()) => {
                tracing::info!(job = %job_name, tenant = %db, "tenant body succeeded");
                report.succeeded.push(db);
            }
            Err(e) => {
                tracing::error!(job = %job_name, tenant = %db, "tenant body failed: {}", e);
                report.failed.push((db, e.to_string()));
            }
        }
    }
    report
}

/// Catalog-driven fan-out: bind main, list tenants, iterate.
pub async fn run_fan_out<F, Fut>(
    catalog: &Catalog,
    main_db: &str,
    job_name: &str,
    body: F,
) -> anyhow::Result<FanOutReport>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    crate::tenant::with_tenant(main_db.to_string(), async {
        let databases = catalog.tenant_databases().await?;
        Ok(fan_out_tenants(databases, job_name, body).await)
    })
    .await
}

/// Everything the worker's jobs need, shared by Arc.
#[derive(Clone)]
pub struct JobContext {
    pub pools: Arc<PoolRegistry>,
    pub catalog: Arc<Catalog>,
    pub settings: PoolSettings,
    pub mailer: Mailer,
    pub telegram: TelegramClient,
    pub fx_client: RateProviderClient,
    pub rclone_remote: String,
}

pub struct FxFetchJob {
    ctx: JobContext,
}

#[async_trait]
impl Job for FxFetchJob {
    fn name(&self) -> &str {
        "fx-fetch"
    }

    fn schedule(&self) -> &str {
        // Hourly at :48.
        "0 48 * * * *"
    }

    async fn execute(&self) -> Result<(), JobError> {
        let rates = self.ctx.fx_client.latest().await?;
        let pool = self.ctx.pools.main_pool()?;
        let written = fx::store_rates(&pool, &rates).await?;
        tracing::info!(rows = written, "fx rates refreshed");
        Ok(())
    }
}

pub struct SalaryJob {
    ctx: JobContext,
}

#[async_trait]
impl Job for SalaryJob {
    fn name(&self) -> &str {
        "salary"
    }

    fn schedule(&self) -> &str {
        "0 0 19 * * *"
    }

    async fn execute(&self) -> Result<(), JobError> {
        let ctx = self.ctx.clone();
        let catalog = ctx.catalog.clone();
        let main_db = ctx.pools.main_db().to_string();
        let report = run_fan_out(&catalog, &main_db, self.name(), move |db| {
            let ctx = ctx.clone();
            async move {
                let pool = ctx.pools.current_pool()?;
                let summary: Option<String> =
                    sqlx::query_scalar("SELECT sp_calculate_salaries()")
                        .fetch_one(&*pool)
                        .await?;

                let recipient = ctx.catalog.gallery_for_db(&db).and_then(|g| g.email);
                if let (Some(summary), Some(email)) = (summary, recipient) {
                    ctx.mailer
                        .send(&email, "Daily salary report", summary)
                        .await?;
                }
                Ok(())
            }
        })
        .await?;

        tracing::info!(
            ok = report.succeeded.len(),
            failed = report.failed.len(),
            "salary run finished"
        );
        Ok(())
    }
}

pub struct NotifySweepJob {
    ctx: JobContext,
}

#[async_trait]
impl Job for NotifySweepJob {
    fn name(&self) -> &str {
        "notify-sweep"
    }

    fn schedule(&self) -> &str {
        "0 0 9 * * *"
    }

    async fn execute(&self) -> Result<(), JobError> {
        let ctx = self.ctx.clone();
        let catalog = ctx.catalog.clone();
        let main_db = ctx.pools.main_db().to_string();
        let report = run_fan_out(&catalog, &main_db, self.name(), move |_db| {
            let ctx = ctx.clone();
            async move {
                let pool = ctx.pools.current_pool()?;
                let sent = notifications::sweep_ready_bills(&pool, &ctx.telegram).await?;
                if sent > 0 {
                    tracing::info!(sent = sent, "notify sweep pushed messages");
                }
                Ok(())
            }
        })
        .await?;

        tracing::info!(
            ok = report.succeeded.len(),
            failed = report.failed.len(),
            "notify sweep finished"
        );
        Ok(())
    }
}

pub struct BackupJob {
    ctx: JobContext,
    cadence: BackupCadence,
    name: String,
}

impl BackupJob {
    pub fn new(ctx: JobContext, cadence: BackupCadence) -> Self {
        let name = format!("backup-{}", cadence.dir_name());
        Self { ctx, cadence, name }
    }

    /// One full run outside the scheduler, for the CLI.
    pub async fn run_once(&self) -> anyhow::Result<FanOutReport> {
        let ctx = self.ctx.clone();
        let catalog = ctx.catalog.clone();
        let main_db = ctx.pools.main_db().to_string();
        let cadence = self.cadence;
        run_fan_out(&catalog, &main_db, &self.name, move |db| {
            let ctx = ctx.clone();
            async move {
                backup::backup_database(&ctx.settings, &ctx.rclone_remote, &db, cadence).await
            }
        })
        .await
    }
}

#[async_trait]
impl Job for BackupJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self) -> &str {
        self.cadence.schedule()
    }

    async fn execute(&self) -> Result<(), JobError> {
        let report = self.run_once().await?;
        tracing::info!(
            job = %self.name,
            ok = report.succeeded.len(),
            failed = report.failed.len(),
            "backup run finished"
        );
        Ok(())
    }
}

pub struct BackupCleanupJob {
    ctx: JobContext,
    cadence: BackupCadence,
    name: String,
}

impl BackupCleanupJob {
    pub fn new(ctx: JobContext, cadence: BackupCadence) -> Self {
        let name = format!("backup-cleanup-{}", cadence.dir_name());
        Self { ctx, cadence, name }
    }

    pub async fn run_once(&self) -> anyhow::Result<FanOutReport> {
        let ctx = self.ctx.clone();
        let catalog = ctx.catalog.clone();
        let main_db = ctx.pools.main_db().to_string();
        let cadence = self.cadence;
        run_fan_out(&catalog, &main_db, &self.name, move |db| {
            let ctx = ctx.clone();
            async move {
                let removed = backup::cleanup_remote(&ctx.rclone_remote, &db, cadence).await?;
                if removed > 0 {
                    tracing::info!(tenant = %db, removed = removed, "pruned stale backups");
                }
                Ok(())
            }
        })
        .await
    }
}

#[async_trait]
impl Job for BackupCleanupJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self) -> &str {
        self.cadence.cleanup_schedule()
    }

    async fn execute(&self) -> Result<(), JobError> {
        let report = self.run_once().await?;
        tracing::info!(
            job = %self.name,
            ok = report.succeeded.len(),
            failed = report.failed.len(),
            "backup cleanup finished"
        );
        Ok(())
    }
}

/// Register the full job calendar on a fresh scheduler.
pub async fn build_scheduler(ctx: JobContext) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new();

    scheduler
        .register_job(Box::new(FxFetchJob { ctx: ctx.clone() }))
        .await?;
    scheduler
        .register_job(Box::new(SalaryJob { ctx: ctx.clone() }))
        .await?;
    scheduler
        .register_job(Box::new(NotifySweepJob { ctx: ctx.clone() }))
        .await?;
    for cadence in BackupCadence::ALL {
        scheduler
            .register_job(Box::new(BackupJob::new(ctx.clone(), cadence)))
            .await?;
        scheduler
            .register_job(Box::new(BackupCleanupJob::new(ctx.clone(), cadence)))
            .await?;
    }

    Ok(scheduler)
}
