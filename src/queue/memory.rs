//! In-memory job queue with the Postgres queue's lease semantics, for tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::util::error::Result;

use super::store::JobQueue;
use super::types::{JobStatus, NewJob, QueuedJob};

struct MemJob {
    id: i64,
    job: NewJob,
    status: JobStatus,
    attempt: i32,
    run_at: DateTime<Utc>,
    enqueued_at: DateTime<Utc>,
    last_error: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub(crate) struct MemoryJobQueue {
    jobs: Mutex<Vec<MemJob>>,
}

impl MemoryJobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn statuses(&self) -> Vec<(i64, JobStatus)> {
        let jobs = self.jobs.lock().expect("queue mutex");
        jobs.iter().map(|j| (j.id, j.status)).collect()
    }

    pub(crate) fn last_error(&self, job_id: i64) -> Option<String> {
        let jobs = self.jobs.lock().expect("queue mutex");
        jobs.iter()
            .find(|j| j.id == job_id)
            .and_then(|j| j.last_error.clone())
    }

    pub(crate) fn pending_rechecks(&self) -> usize {
        let jobs = self.jobs.lock().expect("queue mutex");
        jobs.iter()
            .filter(|j| {
                j.job.job_type == super::types::JobType::Recheck
                    && matches!(j.status, JobStatus::Pending | JobStatus::Retrying)
            })
            .count()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<i64> {
        let mut jobs = self.jobs.lock().expect("queue mutex");
        let id = jobs.len() as i64 + 1;
        let run_at = job.run_at;
        jobs.push(MemJob {
            id,
            job,
            status: JobStatus::Pending,
            attempt: 0,
            run_at,
            enqueued_at: Utc::now(),
            last_error: None,
            lease_expires_at: None,
        });
        Ok(id)
    }

    async fn pick_next(&self, lease: Duration) -> Result<Option<QueuedJob>> {
        let mut jobs = self.jobs.lock().expect("queue mutex");
        let now = Utc::now();

        let next = jobs
            .iter_mut()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Retrying) && j.run_at <= now
            })
            .min_by_key(|j| (j.run_at, j.id));

        let Some(job) = next else {
            return Ok(None);
        };

        job.status = JobStatus::Running;
        job.attempt += 1;
        job.lease_expires_at =
            Some(now + chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::zero()));

        Ok(Some(QueuedJob {
            id: job.id,
            job_type: job.job.job_type,
            article_id: job.job.article_id.clone(),
            attempt: job.attempt,
            max_attempts: job.job.max_attempts,
            enqueued_at: job.enqueued_at,
        }))
    }

    async fn ack(&self, job_id: i64) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("queue mutex");
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.lease_expires_at = None;
        }
        Ok(())
    }

    async fn nack(&self, job_id: i64, delay: Duration, reason: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("queue mutex");
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Retrying;
            job.run_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            job.last_error = Some(reason.to_string());
            job.lease_expires_at = None;
        }
        Ok(())
    }

    async fn dead_letter(&self, job_id: i64, reason: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("queue mutex");
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Dead;
            job.last_error = Some(reason.to_string());
            job.lease_expires_at = None;
        }
        Ok(())
    }

    async fn depth(&self) -> Result<i64> {
        let jobs = self.jobs.lock().expect("queue mutex");
        Ok(jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Retrying))
            .count() as i64)
    }

    async fn release_expired(&self) -> Result<u64> {
        let mut jobs = self.jobs.lock().expect("queue mutex");
        let now = Utc::now();
        let mut released = 0;
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Running
                && job.lease_expires_at.is_some_and(|t| t < now)
            {
                job.status = JobStatus::Retrying;
                job.run_at = now;
                job.lease_expires_at = None;
                released += 1;
            }
        }
        Ok(released)
    }
}
