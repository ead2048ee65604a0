//! Per-article ingestion pipeline: fingerprint presence check, candidate
//! recall, exact verification, cluster assignment, write-back.

pub(crate) mod cluster;
pub(crate) mod recall;
pub(crate) mod verify;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::fingerprint::{ShingleSet, normalize};
use crate::observability::metrics::Metrics;
use crate::queue::{JobQueue, JobType, NewJob, QueuedJob};
use crate::store::gateway::IndexGateway;
use crate::store::models::{AssignmentWrite, ClusterStatus};
use crate::util::error::{Error, Result};

use cluster::{Assignment, ClusterManager};
use recall::CandidateRecall;
use verify::JaccardVerifier;

pub(crate) struct IngestPipeline {
    gateway: Arc<dyn IndexGateway>,
    queue: Arc<dyn JobQueue>,
    recall: CandidateRecall,
    verifier: JaccardVerifier,
    manager: ClusterManager,
    metrics: Arc<Metrics>,
    recheck_delay: Duration,
    job_max_attempts: i32,
}

impl IngestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        gateway: Arc<dyn IndexGateway>,
        queue: Arc<dyn JobQueue>,
        recall: CandidateRecall,
        verifier: JaccardVerifier,
        manager: ClusterManager,
        metrics: Arc<Metrics>,
        recheck_delay: Duration,
        job_max_attempts: i32,
    ) -> Self {
        Self {
            gateway,
            queue,
            recall,
            verifier,
            manager,
            metrics,
            recheck_delay,
            job_max_attempts,
        }
    }

    /// Process one queue job to a terminal article state.
    ///
    /// Idempotent under at-least-once delivery: a terminal article is only
    /// reprocessed by an explicit recheck job, and a redelivered append is a
    /// no-op inside the cluster manager.
    pub(crate) async fn process(&self, job: &QueuedJob) -> Result<()> {
        let article_id = &job.article_id;

        let Some(doc) = self.gateway.get_article(article_id).await? else {
            return Err(Error::ArticleNotFound(article_id.clone()));
        };

        if doc.article.cluster_status != ClusterStatus::Pending && job.job_type != JobType::Recheck
        {
            debug!(%article_id, status = doc.article.cluster_status.as_str(), "already terminal, skipping");
            return Ok(());
        }

        let previous_cluster = doc.article.cluster_id.clone();

        let shingles = ShingleSet::build(&normalize(&doc.article.content));
        if shingles.distinct() <= 1 {
            // Empty or degenerate content can never clear the threshold.
            self.write_terminal(article_id, &AssignmentWrite::unique(), previous_cluster.as_deref())
                .await?;
            info!(%article_id, "degenerate content, marked unique");
            return Ok(());
        }

        let recall_timer = self.metrics.recall_duration.start_timer();
        let candidates = self.recall.recall(article_id, &doc.fingerprint).await?;
        recall_timer.observe_duration();

        let verify_timer = self.metrics.verify_duration.start_timer();
        let outcome = self.verifier.verify(&shingles, &candidates).await?;
        verify_timer.observe_duration();

        if outcome.truncated {
            // Degraded verification: the match set is incomplete, so it must
            // not drive assignment. Land tentatively unique and recompute
            // once load subsides.
            self.metrics.verifier_truncated.inc();
            self.queue
                .enqueue(NewJob {
                    job_type: JobType::Recheck,
                    article_id: article_id.clone(),
                    run_at: Utc::now()
                        + chrono::Duration::from_std(self.recheck_delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60)),
                    max_attempts: self.job_max_attempts,
                })
                .await?;
            self.write_terminal(article_id, &AssignmentWrite::unique(), previous_cluster.as_deref())
                .await?;

            self.metrics.articles_processed.inc();
            self.metrics.articles_unique.inc();
            info!(%article_id, "verifier truncated, tentatively unique, recheck scheduled");
            return Ok(());
        }

        let assign_timer = self.metrics.assign_duration.start_timer();
        let assignment = self.manager.assign(&doc, &outcome.matches).await?;
        assign_timer.observe_duration();

        let write = match &assignment {
            Assignment::Unique => AssignmentWrite::unique(),
            Assignment::Matched { cluster_id, score } => {
                AssignmentWrite::matched(cluster_id.clone(), *score)
            }
        };
        self.write_terminal(article_id, &write, previous_cluster.as_deref())
            .await?;

        self.metrics.articles_processed.inc();
        match &assignment {
            Assignment::Unique => {
                self.metrics.articles_unique.inc();
                info!(%article_id, "article unique");
            }
            Assignment::Matched { cluster_id, score } => {
                self.metrics.articles_matched.inc();
                info!(%article_id, %cluster_id, score, "article matched");
            }
        }

        Ok(())
    }

    /// Write the article's terminal state, then drop the tentatively
    /// retained previous membership when the cluster changed.
    async fn write_terminal(
        &self,
        article_id: &str,
        write: &AssignmentWrite,
        previous_cluster: Option<&str>,
    ) -> Result<()> {
        self.gateway.update_assignment(article_id, write).await?;

        if let Some(previous) = previous_cluster {
            if write.cluster_id.as_deref() != Some(previous) {
                self.manager.remove_member(previous, article_id).await?;
            }
        }
        Ok(())
    }
}
