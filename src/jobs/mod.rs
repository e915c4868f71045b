//! Background job queue interface. Enqueue is fire-and-forget: handlers never
//! wait for job completion, and execution semantics belong to the worker
//! fleet, not this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::fact_table::AutoFactTableToCreate;
use crate::models::metric::AutoMetricToCreate;
use crate::models::new_id;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to enqueue job: {0}")]
    Enqueue(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Job {
    #[serde(rename_all = "camelCase")]
    CreateAutoMetrics {
        organization: String,
        datasource_id: String,
        metrics: Vec<AutoMetricToCreate>,
        owner: String,
    },
    #[serde(rename_all = "camelCase")]
    CreateAutoFactTables {
        organization: String,
        datasource_id: String,
        fact_tables: Vec<AutoFactTableToCreate>,
        owner: String,
    },
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), JobError>;
}

/// Durable queue backed by the platform database; workers poll the table.
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub async fn new(pool: PgPool) -> Result<Self, JobError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                payload JSONB NOT NULL,
                enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                started_at TIMESTAMPTZ,
                finished_at TIMESTAMPTZ
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| JobError::Enqueue(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), JobError> {
        let payload = serde_json::to_value(&job).map_err(|e| JobError::Enqueue(e.to_string()))?;
        sqlx::query("INSERT INTO jobs (id, payload) VALUES ($1, $2)")
            .bind(new_id("job"))
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| JobError::Enqueue(e.to_string()))?;
        tracing::info!("enqueued background job");
        Ok(())
    }
}

/// Recording queue for tests and in-memory development mode.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueued(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), JobError> {
        self.jobs.lock().await.push(job);
        Ok(())
    }
}
