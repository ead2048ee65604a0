//! Work queue over the shared Postgres pool.
//!
//! Jobs are leased with `FOR UPDATE SKIP LOCKED`, giving at-least-once
//! delivery across the worker pool: a worker that dies mid-job leaves a
//! `running` row whose lease expires, and the janitor returns it to the
//! queue. Queue depth is the backpressure signal exported as a gauge.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::util::error::{Error, Result, from_sqlx};

use super::types::{JobStatus, JobType, NewJob, QueuedJob};

#[async_trait]
pub(crate) trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: NewJob) -> Result<i64>;

    /// Lease the next runnable job. Increments its attempt counter and sets
    /// the lease expiry; returns `None` when the queue is empty.
    async fn pick_next(&self, lease: Duration) -> Result<Option<QueuedJob>>;

    async fn ack(&self, job_id: i64) -> Result<()>;

    /// Return a job to the queue after a transient failure, delayed by the
    /// caller-computed backoff.
    async fn nack(&self, job_id: i64, delay: Duration, reason: &str) -> Result<()>;

    async fn dead_letter(&self, job_id: i64, reason: &str) -> Result<()>;

    /// Number of jobs waiting to run.
    async fn depth(&self) -> Result<i64>;

    /// Return expired `running` leases to the queue; returns how many were
    /// released.
    async fn release_expired(&self) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub(crate) struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<i64> {
        let row = sqlx::query(
            r"
            INSERT INTO similarity_jobs
                (job_type, article_id, status, attempt, max_attempts, run_at, enqueued_at)
            VALUES ($1, $2, 'pending', 0, $3, $4, NOW())
            RETURNING id
            ",
        )
        .bind(job.job_type.as_str())
        .bind(&job.article_id)
        .bind(job.max_attempts)
        .bind(job.run_at)
        .fetch_one(&self.pool)
        .await
        .map_err(from_sqlx)?;

        row.try_get("id").map_err(from_sqlx)
    }

    async fn pick_next(&self, lease: Duration) -> Result<Option<QueuedJob>> {
        let mut tx = self.pool.begin().await.map_err(from_sqlx)?;

        let row = sqlx::query(
            r"
            SELECT id, job_type, article_id, attempt, max_attempts, enqueued_at
            FROM similarity_jobs
            WHERE status IN ('pending', 'retrying') AND run_at <= NOW()
            ORDER BY run_at, id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            ",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(from_sqlx)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(from_sqlx)?;
            return Ok(None);
        };

        let id: i64 = row.try_get("id").map_err(from_sqlx)?;
        let job_type_raw: String = row.try_get("job_type").map_err(from_sqlx)?;
        let job_type = JobType::from_str(&job_type_raw)
            .ok_or_else(|| Error::internal(anyhow::anyhow!("invalid job type {job_type_raw}")))?;
        let attempt: i32 = row.try_get("attempt").map_err(from_sqlx)?;

        let lease_expires = Utc::now()
            + chrono::Duration::from_std(lease)
                .map_err(|error| Error::internal(anyhow::anyhow!(error)))?;

        sqlx::query(
            r"
            UPDATE similarity_jobs
            SET status = $2,
                attempt = attempt + 1,
                started_at = NOW(),
                lease_expires_at = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(JobStatus::Running.as_str())
        .bind(lease_expires)
        .execute(&mut *tx)
        .await
        .map_err(from_sqlx)?;

        tx.commit().await.map_err(from_sqlx)?;

        Ok(Some(QueuedJob {
            id,
            job_type,
            article_id: row.try_get("article_id").map_err(from_sqlx)?,
            attempt: attempt + 1,
            max_attempts: row.try_get("max_attempts").map_err(from_sqlx)?,
            enqueued_at: row.try_get("enqueued_at").map_err(from_sqlx)?,
        }))
    }

    async fn ack(&self, job_id: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE similarity_jobs
            SET status = $2, completed_at = NOW(), lease_expires_at = NULL
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.as_str())
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;
        Ok(())
    }

    async fn nack(&self, job_id: i64, delay: Duration, reason: &str) -> Result<()> {
        let run_at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|error| Error::internal(anyhow::anyhow!(error)))?;

        sqlx::query(
            r"
            UPDATE similarity_jobs
            SET status = $2,
                run_at = $3,
                last_error = $4,
                lease_expires_at = NULL
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(JobStatus::Retrying.as_str())
        .bind(run_at)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;
        Ok(())
    }

    async fn dead_letter(&self, job_id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE similarity_jobs
            SET status = $2, last_error = $3, completed_at = NOW(), lease_expires_at = NULL
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(JobStatus::Dead.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;
        Ok(())
    }

    async fn depth(&self) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS depth FROM similarity_jobs WHERE status IN ('pending', 'retrying')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(from_sqlx)?;

        row.try_get("depth").map_err(from_sqlx)
    }

    async fn release_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE similarity_jobs
            SET status = 'retrying', run_at = NOW(), lease_expires_at = NULL
            WHERE status = 'running' AND lease_expires_at < NOW()
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        Ok(result.rows_affected())
    }
}
