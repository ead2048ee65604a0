//! Core error taxonomy and retry classification.

use thiserror::Error;

/// Errors surfaced by the similarity core.
///
/// Workers recover `Conflict` and transient `Upstream` failures locally;
/// everything else is either mapped to an API error envelope or sent to the
/// dead-letter queue.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Input(String),

    #[error("article not found: {0}")]
    ArticleNotFound(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("article already exists with different content: {0}")]
    ArticleAlreadyExists(String),

    #[error("cluster is still pending for article {0}")]
    ClusterPending(String),

    /// Optimistic version check failed and the retry budget is exhausted.
    #[error("cluster version conflict on {0}")]
    Conflict(String),

    #[error("recheck rate limited for caller {0}")]
    RecheckRateLimited(String),

    /// Gateway or queue unreachable; retried with backoff before surfacing.
    #[error("upstream unavailable: {0}")]
    Upstream(#[source] anyhow::Error),

    /// Verification budget exhausted; downgraded to a tentative `unique`
    /// plus a delayed recheck rather than surfaced as a failure.
    #[error("verification budget exhausted")]
    Resource,

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn upstream(error: impl Into<anyhow::Error>) -> Self {
        Error::Upstream(error.into())
    }

    pub fn internal(error: impl Into<anyhow::Error>) -> Self {
        Error::Internal(error.into())
    }

    /// Stable machine-readable code, echoed in API error envelopes.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::Input(_) => "INVALID_ARGUMENT",
            Error::ArticleNotFound(_) => "ARTICLE_NOT_FOUND",
            Error::ClusterNotFound(_) => "CLUSTER_NOT_FOUND",
            Error::ArticleAlreadyExists(_) => "ARTICLE_ALREADY_EXISTS",
            Error::ClusterPending(_) => "CLUSTER_PENDING",
            Error::Conflict(_) => "CLUSTER_CONFLICT",
            Error::RecheckRateLimited(_) => "RECHECK_RATE_LIMITED",
            Error::Upstream(_) => "UPSTREAM_UNAVAILABLE",
            Error::Resource => "RESOURCE_EXHAUSTED",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a queue worker should retry the job after backoff.
    ///
    /// Conflicts are retried because the verified match set stays valid
    /// against fresh cluster state; upstream failures are transient by
    /// definition. Everything else is permanent for a given job payload.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Upstream(_))
    }
}

/// Map a sqlx failure onto the core taxonomy: connectivity problems are
/// retryable upstream errors, everything else is a programmer or data error.
pub fn from_sqlx(error: sqlx::Error) -> Error {
    match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Error::upstream(error),
        sqlx::Error::Database(db) if db.code().as_deref() == Some("40001") => {
            // serialization_failure
            Error::upstream(error)
        }
        _ => Error::internal(error),
    }
}
