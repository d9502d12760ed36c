//! Per-tenant print-job queue in Redis.
//!
//! Job ids come from an atomic per-tenant counter, so two concurrent
//! enqueues always get distinct, strictly increasing ids. Jobs live in a
//! per-tenant list in insertion order; `ack` is the only removal path,
//! with a hard cap to keep an unresponsive printer from growing the list
//! forever.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Oldest jobs beyond this count are dropped (and the drop logged).
pub const MAX_QUEUE_LENGTH: isize = 500;

fn counter_key(tenant: &str) -> String {
    format!("tenant:last_job_id:{}", tenant)
}

fn list_key(tenant: &str) -> String {
    format!("tenant:print_jobs:{}", tenant)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    pub id: i64,
    pub file_name: String,
    /// Opaque payload, base64 for transport.
    pub payload: String,
    pub tenant: String,
}

impl PrintJob {
    pub fn decode_payload(&self) -> Result<Vec<u8>, AppError> {
        BASE64
            .decode(&self.payload)
            .map_err(|e| AppError::BadRequest(format!("invalid print payload: {}", e)))
    }
}

#[derive(Clone)]
pub struct PrintQueue {
    redis_client: Client,
}

impl PrintQueue {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            redis_client: Client::open(redis_url)?,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.redis_client.get_multiplexed_async_connection().await
    }

    /// Allocate the next id for `tenant` and append the job.
    pub async fn enqueue(
        &self,
        tenant: &str,
        file_name: &str,
        payload: &[u8],
    ) -> Result<i64, AppError> {
        let mut conn = self.connection().await?;

        let id: i64 = conn.incr(counter_key(tenant), 1).await?;
        let job = PrintJob {
            id,
            file_name: file_name.to_string(),
            payload: BASE64.encode(payload),
            tenant: tenant.to_string(),
        };
        let encoded = serde_json::to_string(&job)
            .map_err(|e| AppError::Internal(format!("print job encode: {}", e)))?;

        let key = list_key(tenant);
        let length: isize = conn.rpush(&key, encoded).await?;
        if length > MAX_QUEUE_LENGTH {
            let dropped = length - MAX_QUEUE_LENGTH;
            let _: () = conn.ltrim(&key, -MAX_QUEUE_LENGTH, -1).await?;
            tracing::warn!(
                tenant = %tenant,
                dropped = dropped,
                "print queue over capacity, dropped oldest jobs"
            );
        }

        Ok(id)
    }

    /// All jobs with id greater than `since`, in submission order.
    pub async fn poll(&self, tenant: &str, since: i64) -> Result<Vec<PrintJob>, AppError> {
        let mut conn = self.connection().await?;
        let entries: Vec<String> = conn.lrange(list_key(tenant), 0, -1).await?;

        let mut jobs = Vec::new();
        for entry in entries {
            match serde_json::from_str::<PrintJob>(&entry) {
                Ok(job) if job.id > since => jobs.push(job),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(tenant = %tenant, "skipping malformed print job: {}", e);
                }
            }
        }
        Ok(jobs)
    }

    /// Remove the job with `job_id`; silently a no-op if absent.
    pub async fn ack(&self, tenant: &str, job_id: i64) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let key = list_key(tenant);
        let entries: Vec<String> = conn.lrange(&key, 0, -1).await?;

        for entry in entries {
            if let Ok(job) = serde_json::from_str::<PrintJob>(&entry) {
                if job.id == job_id {
                    let _: () = conn.lrem(&key, 1, entry).await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
