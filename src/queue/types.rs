use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of work carried by a queue message. Recheck jobs skip the
/// terminal-state short-circuit so an article can be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum JobType {
    Ingest,
    Recheck,
}

impl JobType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            JobType::Ingest => "ingest",
            JobType::Recheck => "recheck",
        }
    }

    pub(crate) fn from_str(s: &str) -> Option<Self> {
        match s {
            "ingest" => Some(JobType::Ingest),
            "recheck" => Some(JobType::Recheck),
            _ => None,
        }
    }
}

/// Lifecycle of a queued job. `Dead` rows are kept for operator inspection
/// together with their `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum JobStatus {
    Pending,
    Running,
    Completed,
    Retrying,
    Dead,
}

impl JobStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Retrying => "retrying",
            JobStatus::Dead => "dead",
        }
    }

    #[allow(dead_code)]
    pub(crate) fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "retrying" => Some(JobStatus::Retrying),
            "dead" => Some(JobStatus::Dead),
            _ => None,
        }
    }
}

/// A leased job as handed to a worker. `attempt` counts the current
/// delivery (1-based), so at-least-once redeliveries are visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedJob {
    pub(crate) id: i64,
    pub(crate) job_type: JobType,
    pub(crate) article_id: String,
    pub(crate) attempt: i32,
    pub(crate) max_attempts: i32,
    pub(crate) enqueued_at: DateTime<Utc>,
}

/// A job to insert. `run_at` in the future produces a delayed delivery
/// (used by verifier-truncation rechecks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewJob {
    pub(crate) job_type: JobType,
    pub(crate) article_id: String,
    pub(crate) run_at: DateTime<Utc>,
    pub(crate) max_attempts: i32,
}
