/// Prometheus metric definitions for the similarity core.
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    // Counters
    pub articles_submitted: Counter,
    pub articles_processed: Counter,
    pub articles_matched: Counter,
    pub articles_unique: Counter,
    pub clusters_created: Counter,
    pub cluster_conflicts: Counter,
    pub merge_candidates: Counter,
    pub verifier_truncated: Counter,
    pub jobs_dead_lettered: Counter,
    pub job_retries: Counter,
    pub recheck_jobs: Counter,
    pub recheck_rejected: Counter,

    // Histograms
    pub recall_duration: Histogram,
    pub verify_duration: Histogram,
    pub assign_duration: Histogram,
    pub job_duration: Histogram,

    // Gauges
    pub queue_depth: Gauge,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            articles_submitted: register_counter_with_registry!(
                "simdoc_articles_submitted_total",
                "Total number of articles accepted for ingestion",
                registry
            )?,
            articles_processed: register_counter_with_registry!(
                "simdoc_articles_processed_total",
                "Total number of articles that reached a terminal cluster state",
                registry
            )?,
            articles_matched: register_counter_with_registry!(
                "simdoc_articles_matched_total",
                "Articles assigned to a cluster",
                registry
            )?,
            articles_unique: register_counter_with_registry!(
                "simdoc_articles_unique_total",
                "Articles marked unique",
                registry
            )?,
            clusters_created: register_counter_with_registry!(
                "simdoc_clusters_created_total",
                "Total number of clusters created",
                registry
            )?,
            cluster_conflicts: register_counter_with_registry!(
                "simdoc_cluster_conflicts_total",
                "Optimistic cluster write conflicts (including recovered retries)",
                registry
            )?,
            merge_candidates: register_counter_with_registry!(
                "simdoc_merge_candidates_total",
                "Assignments that matched more than one existing cluster",
                registry
            )?,
            verifier_truncated: register_counter_with_registry!(
                "simdoc_verifier_truncated_total",
                "Verification runs cut short by the candidate or time budget",
                registry
            )?,
            jobs_dead_lettered: register_counter_with_registry!(
                "simdoc_jobs_dead_lettered_total",
                "Jobs moved to the dead-letter state",
                registry
            )?,
            job_retries: register_counter_with_registry!(
                "simdoc_job_retries_total",
                "Jobs returned to the queue after a transient failure",
                registry
            )?,
            recheck_jobs: register_counter_with_registry!(
                "simdoc_recheck_jobs_total",
                "Recheck jobs accepted by the controller",
                registry
            )?,
            recheck_rejected: register_counter_with_registry!(
                "simdoc_recheck_rejected_total",
                "Recheck requests rejected by cooldown or rate limiting",
                registry
            )?,
            recall_duration: register_histogram_with_registry!(
                "simdoc_recall_duration_seconds",
                "Duration of candidate recall per article",
                registry
            )?,
            verify_duration: register_histogram_with_registry!(
                "simdoc_verify_duration_seconds",
                "Duration of exact verification per article",
                registry
            )?,
            assign_duration: register_histogram_with_registry!(
                "simdoc_assign_duration_seconds",
                "Duration of cluster assignment per article",
                registry
            )?,
            job_duration: register_histogram_with_registry!(
                "simdoc_job_duration_seconds",
                "Duration of entire job processing",
                registry
            )?,
            queue_depth: register_gauge_with_registry!(
                "simdoc_queue_depth",
                "Number of jobs waiting in the similarity queue",
                registry
            )?,
        })
    }
}
