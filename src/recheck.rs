//! Recheck controller: rate-limited re-enqueueing of processed articles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::info;

use crate::observability::metrics::Metrics;
use crate::queue::{JobQueue, JobType, NewJob};
use crate::store::gateway::IndexGateway;
use crate::util::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecheckReceipt {
    pub(crate) accepted: usize,
    pub(crate) job_id: String,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

struct ControllerState {
    /// Per-article cooldown expiry.
    cooldowns: HashMap<String, Instant>,
    /// Per-caller token buckets.
    buckets: HashMap<String, TokenBucket>,
    /// Day stamp (yyyymmdd) the counter belongs to.
    day: String,
    counter: u32,
}

pub(crate) struct RecheckController {
    gateway: Arc<dyn IndexGateway>,
    queue: Arc<dyn JobQueue>,
    metrics: Arc<Metrics>,
    cooldown: Duration,
    rate_per_min: u32,
    job_max_attempts: i32,
    state: Mutex<ControllerState>,
}

impl RecheckController {
    pub(crate) fn new(
        gateway: Arc<dyn IndexGateway>,
        queue: Arc<dyn JobQueue>,
        metrics: Arc<Metrics>,
        cooldown: Duration,
        rate_per_min: u32,
        job_max_attempts: i32,
    ) -> Self {
        Self {
            gateway,
            queue,
            metrics,
            cooldown,
            rate_per_min,
            job_max_attempts,
            state: Mutex::new(ControllerState {
                cooldowns: HashMap::new(),
                buckets: HashMap::new(),
                day: String::new(),
                counter: 0,
            }),
        }
    }

    /// Enqueue recheck jobs for the given articles.
    ///
    /// The whole request is rejected when the caller's token bucket cannot
    /// cover it; individual articles still inside their cooldown window are
    /// silently skipped and not counted as accepted.
    pub(crate) async fn schedule(
        &self,
        caller: &str,
        article_ids: &[String],
        reason: &str,
    ) -> Result<RecheckReceipt> {
        let (eligible, job_id) = {
            let mut state = self.state.lock().expect("recheck state mutex");
            let now = Instant::now();

            let rate = f64::from(self.rate_per_min);
            let bucket = state
                .buckets
                .entry(caller.to_string())
                .or_insert_with(|| TokenBucket {
                    tokens: rate,
                    last_refill: now,
                });
            let elapsed_min = now.duration_since(bucket.last_refill).as_secs_f64() / 60.0;
            bucket.tokens = (bucket.tokens + elapsed_min * rate).min(rate);
            bucket.last_refill = now;

            let requested = article_ids.len() as f64;
            if bucket.tokens < requested {
                self.metrics.recheck_rejected.inc();
                return Err(Error::RecheckRateLimited(caller.to_string()));
            }
            bucket.tokens -= requested;

            let eligible: Vec<String> = article_ids
                .iter()
                .filter(|id| {
                    state
                        .cooldowns
                        .get(id.as_str())
                        .is_none_or(|&expiry| expiry <= now)
                })
                .cloned()
                .collect();
            for id in &eligible {
                state.cooldowns.insert(id.clone(), now + self.cooldown);
            }

            let today = Utc::now().format("%Y%m%d").to_string();
            if state.day != today {
                state.day = today;
                state.counter = 0;
            }
            state.counter += 1;
            let job_id = format!("recheck_{}_{:04}", state.day, state.counter);

            (eligible, job_id)
        };

        let mut accepted = 0usize;
        for article_id in &eligible {
            // Unknown articles are skipped rather than failing the batch.
            match self.gateway.mark_pending(article_id).await {
                Ok(()) => {}
                Err(Error::ArticleNotFound(_)) => continue,
                Err(other) => return Err(other),
            }

            self.queue
                .enqueue(NewJob {
                    job_type: JobType::Recheck,
                    article_id: article_id.clone(),
                    run_at: Utc::now(),
                    max_attempts: self.job_max_attempts,
                })
                .await?;
            accepted += 1;
        }

        self.metrics.recheck_jobs.inc_by(accepted as f64);
        info!(caller, accepted, %job_id, reason, "rechecks scheduled");

        Ok(RecheckReceipt { accepted, job_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Telemetry;
    use crate::queue::memory::MemoryJobQueue;
    use crate::store::memory::MemoryIndexGateway;
    use crate::store::models::ClusterStatus;
    use crate::store::testutil::pending_doc;

    fn controller(
        gateway: Arc<MemoryIndexGateway>,
        queue: Arc<MemoryJobQueue>,
        rate_per_min: u32,
    ) -> RecheckController {
        let telemetry = Telemetry::new().expect("telemetry");
        RecheckController::new(
            gateway,
            queue,
            telemetry.metrics_arc(),
            Duration::from_secs(300),
            rate_per_min,
            5,
        )
    }

    async fn seeded_gateway(ids: &[&str]) -> Arc<MemoryIndexGateway> {
        let gateway = Arc::new(MemoryIndexGateway::new());
        for (i, id) in ids.iter().enumerate() {
            let mut doc = pending_doc(id, "some article content for rechecking purposes", i as i64);
            doc.article.cluster_status = ClusterStatus::Unique;
            gateway.upsert_article(&doc).await.unwrap();
        }
        gateway
    }

    #[tokio::test]
    async fn schedules_rechecks_and_marks_pending() {
        let gateway = seeded_gateway(&["a1", "a2"]).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let controller = controller(gateway.clone(), queue.clone(), 60);

        let receipt = controller
            .schedule("ops", &["a1".into(), "a2".into()], "manual review")
            .await
            .expect("schedule succeeds");

        assert_eq!(receipt.accepted, 2);
        assert!(receipt.job_id.starts_with("recheck_"));
        assert_eq!(queue.pending_rechecks(), 2);

        let doc = gateway.get_article("a1").await.unwrap().unwrap();
        assert_eq!(doc.article.cluster_status, ClusterStatus::Pending);
    }

    #[tokio::test]
    async fn cooldown_skips_recent_articles() {
        let gateway = seeded_gateway(&["a1"]).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let controller = controller(gateway.clone(), queue.clone(), 60);

        let first = controller
            .schedule("ops", &["a1".into()], "first")
            .await
            .unwrap();
        assert_eq!(first.accepted, 1);

        let second = controller
            .schedule("ops", &["a1".into()], "second")
            .await
            .unwrap();
        assert_eq!(second.accepted, 0, "cooldown must skip the article");
        assert_eq!(queue.pending_rechecks(), 1);
    }

    #[tokio::test]
    async fn rate_limit_rejects_oversized_requests() {
        let gateway = seeded_gateway(&["a1", "a2", "a3"]).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let controller = controller(gateway.clone(), queue.clone(), 2);

        let result = controller
            .schedule("ops", &["a1".into(), "a2".into(), "a3".into()], "burst")
            .await;

        assert!(matches!(result, Err(Error::RecheckRateLimited(_))));
        assert_eq!(queue.pending_rechecks(), 0);
    }

    #[tokio::test]
    async fn rate_limit_is_per_caller() {
        let gateway = seeded_gateway(&["a1", "a2"]).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let controller = controller(gateway.clone(), queue.clone(), 1);

        controller
            .schedule("caller-a", &["a1".into()], "first")
            .await
            .expect("caller-a within budget");
        let other = controller
            .schedule("caller-b", &["a2".into()], "second")
            .await
            .expect("caller-b has its own bucket");
        assert_eq!(other.accepted, 1);
    }

    #[tokio::test]
    async fn unknown_articles_are_not_accepted() {
        let gateway = seeded_gateway(&[]).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let controller = controller(gateway.clone(), queue.clone(), 60);

        let receipt = controller
            .schedule("ops", &["ghost".into()], "cleanup")
            .await
            .unwrap();
        assert_eq!(receipt.accepted, 0);
        assert_eq!(queue.pending_rechecks(), 0);
    }

    #[tokio::test]
    async fn job_ids_are_day_scoped_and_sequential() {
        let gateway = seeded_gateway(&["a1", "a2"]).await;
        let queue = Arc::new(MemoryJobQueue::new());
        let controller = controller(gateway.clone(), queue.clone(), 60);

        let first = controller.schedule("ops", &["a1".into()], "x").await.unwrap();
        let second = controller.schedule("ops", &["a2".into()], "y").await.unwrap();

        let day = Utc::now().format("%Y%m%d").to_string();
        assert_eq!(first.job_id, format!("recheck_{day}_0001"));
        assert_eq!(second.job_id, format!("recheck_{day}_0002"));
    }
}
