//! Cron-driven job runner.
//!
//! One tokio task per registered job, each sleeping until its next fire
//! time in the gallery chain's local calendar (Asia/Kabul). A failing
//! execution is logged and the loop keeps going.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Asia::Kabul;
use cron::Schedule;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;
    /// Seconds-resolution cron expression, evaluated in Asia/Kabul.
    fn schedule(&self) -> &str;
    async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub is_active: bool,
    pub next_run: Option<DateTime<Utc>>,
}

struct JobEntry {
    job: Arc<dyn Job>,
    schedule: Schedule,
    handle: Option<JoinHandle<()>>,
}

pub struct JobScheduler {
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_job(&self, job: Box<dyn Job>) -> anyhow::Result<()> {
        let schedule = Schedule::from_str(job.schedule()).map_err(|e| {
            anyhow::anyhow!("invalid cron expression for {}: {}", job.name(), e)
        })?;

        let mut jobs = self.jobs.write().await;
        jobs.insert(
            job.name().to_string(),
            JobEntry {
                job: Arc::from(job),
                schedule,
                handle: None,
            },
        );
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        for entry in jobs.values_mut() {
            if entry.handle.is_some() {
                continue;
            }
            let job = entry.job.clone();
            let schedule = entry.schedule.clone();
            entry.handle = Some(tokio::spawn(run_loop(job, schedule)));
        }
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        for entry in jobs.values_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
        Ok(())
    }

    pub async fn get_job_status(&self) -> HashMap<String, JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    JobStatus {
                        is_active: entry.handle.is_some(),
                        next_run: entry
                            .schedule
                            .upcoming(Kabul)
                            .next()
                            .map(|t| t.with_timezone(&Utc)),
                    },
                )
            })
            .collect()
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_loop(job: Arc<dyn Job>, schedule: Schedule) {
    loop {
        let Some(next) = schedule.upcoming(Kabul).next() else {
            tracing::warn!(job = %job.name(), "schedule has no upcoming fire time");
            return;
        };
        let now = Utc::now().with_timezone(&Kabul);
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        tracing::info!(job = %job.name(), "running scheduled job");
        if let Err(e) = job.execute().await {
            tracing::error!(job = %job.name(), "scheduled job failed: {}", e);
        }
    }
}
