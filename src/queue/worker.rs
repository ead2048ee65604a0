//! Worker pool consuming the similarity queue.
//!
//! Each worker is sequential: it leases one job, drives the pipeline to a
//! terminal state, then acknowledges. Pulling only when idle makes the queue
//! depth the system's backpressure signal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::observability::metrics::Metrics;
use crate::pipeline::IngestPipeline;
use crate::util::error::Result;
use crate::util::retry::RetryConfig;

use super::store::JobQueue;
use super::types::QueuedJob;

const IDLE_POLL: Duration = Duration::from_millis(500);
const ERROR_POLL: Duration = Duration::from_secs(1);
const JANITOR_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) struct WorkerPool {
    workers: Arc<Mutex<Vec<JoinHandle<Result<()>>>>>,
}

struct WorkerContext {
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<IngestPipeline>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
    lease: Duration,
}

impl WorkerPool {
    /// Spawn `concurrency` workers plus the lease janitor.
    pub(crate) fn spawn(
        concurrency: usize,
        queue: Arc<dyn JobQueue>,
        pipeline: Arc<IngestPipeline>,
        metrics: Arc<Metrics>,
        retry: RetryConfig,
        lease: Duration,
    ) -> Self {
        let mut workers = Vec::new();
        for worker_id in 0..concurrency {
            let context = WorkerContext {
                queue: Arc::clone(&queue),
                pipeline: Arc::clone(&pipeline),
                metrics: Arc::clone(&metrics),
                retry,
                lease,
            };
            workers.push(tokio::spawn(async move {
                info!(worker_id, "starting similarity worker");
                run_worker(&context).await
            }));
        }

        workers.push(tokio::spawn(run_janitor(queue, metrics)));

        info!(concurrency, "worker pool started");
        Self {
            workers: Arc::new(Mutex::new(workers)),
        }
    }

    #[allow(dead_code)]
    pub(crate) async fn shutdown(&self) {
        let workers = {
            let mut guard = self.workers.lock().expect("worker pool mutex");
            std::mem::take(&mut *guard)
        };

        for worker in &workers {
            worker.abort();
        }
        for worker in workers {
            let _ = worker.await;
        }
        info!("all similarity workers stopped");
    }
}

async fn run_worker(context: &WorkerContext) -> Result<()> {
    loop {
        match context.queue.pick_next(context.lease).await {
            Ok(Some(job)) => process_one(context, &job).await,
            Ok(None) => sleep(IDLE_POLL).await,
            Err(error) => {
                error!(%error, "failed to pick next job");
                sleep(ERROR_POLL).await;
            }
        }
    }
}

/// Drive one job to ack, retry or dead-letter. Never panics the worker: a
/// failed task is logged and the loop continues.
async fn process_one(context: &WorkerContext, job: &QueuedJob) {
    let timer = context.metrics.job_duration.start_timer();
    let outcome = tokio::time::timeout(context.lease, context.pipeline.process(job)).await;
    timer.observe_duration();

    let error = match outcome {
        Ok(Ok(())) => {
            if let Err(ack_error) = context.queue.ack(job.id).await {
                error!(job_id = job.id, error = %ack_error, "failed to ack job");
            }
            return;
        }
        Ok(Err(error)) => error,
        Err(_elapsed) => crate::util::error::Error::Resource,
    };

    let retryable =
        matches!(error, crate::util::error::Error::Resource) || error.is_retryable();

    if retryable && context.retry.can_retry(job.attempt) {
        let delay = context.retry.delay_for_attempt(job.attempt);
        let delay_ms = delay.as_millis() as u64;
        let queued_for_ms = (chrono::Utc::now() - job.enqueued_at).num_milliseconds();
        warn!(
            job_id = job.id,
            article_id = %job.article_id,
            attempt = job.attempt,
            max_attempts = job.max_attempts,
            delay_ms,
            queued_for_ms,
            %error,
            "job failed, will retry"
        );
        context.metrics.job_retries.inc();
        if let Err(nack_error) = context.queue.nack(job.id, delay, &error.to_string()).await {
            error!(job_id = job.id, error = %nack_error, "failed to nack job");
        }
    } else {
        error!(
            job_id = job.id,
            article_id = %job.article_id,
            attempt = job.attempt,
            %error,
            "job failed permanently, dead-lettering"
        );
        context.metrics.jobs_dead_lettered.inc();
        if let Err(dead_error) = context
            .queue
            .dead_letter(job.id, &error.to_string())
            .await
        {
            error!(job_id = job.id, error = %dead_error, "failed to dead-letter job");
        }
    }
}

/// Return expired leases to the queue and export the depth gauge.
async fn run_janitor(queue: Arc<dyn JobQueue>, metrics: Arc<Metrics>) -> Result<()> {
    loop {
        match queue.release_expired().await {
            Ok(released) if released > 0 => {
                warn!(released, "released expired job leases");
            }
            Ok(_) => {}
            Err(error) => error!(%error, "lease janitor sweep failed"),
        }

        match queue.depth().await {
            Ok(depth) => metrics.queue_depth.set(depth as f64),
            Err(error) => error!(%error, "queue depth probe failed"),
        }

        sleep(JANITOR_INTERVAL).await;
    }
}
