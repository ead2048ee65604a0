//! The document store surface consumed by the similarity core.
//!
//! All cross-worker serialization happens here: cluster writes carry an
//! `expected_version` and fail with `Error::Conflict` when the stored
//! version has moved, so no in-process lock is ever held across a store
//! call.

use async_trait::async_trait;

use crate::util::error::Result;

use super::models::{
    ArticleDoc, ArticleFilter, AssignmentWrite, CandidateRow, Cluster, ClusterMutation,
    MemberSketch, Page,
};

#[async_trait]
pub(crate) trait IndexGateway: Send + Sync {
    /// Idempotent by `article_id`; bumps the document version.
    async fn upsert_article(&self, doc: &ArticleDoc) -> Result<()>;

    async fn get_article(&self, article_id: &str) -> Result<Option<ArticleDoc>>;

    /// Write an article's terminal state (step 6 of the per-article path).
    async fn update_assignment(
        &self,
        article_id: &str,
        assignment: &AssignmentWrite,
    ) -> Result<()>;

    /// Version-checked claim of a not-yet-clustered article for a cluster.
    /// Returns `false` when another worker won the race.
    async fn claim_for_cluster(
        &self,
        article_id: &str,
        cluster_id: &str,
        score: f64,
        expected_version: i64,
    ) -> Result<bool>;

    /// Flip an article back to `pending` for a recheck, retaining its
    /// current cluster membership until the new terminal state is written.
    async fn mark_pending(&self, article_id: &str) -> Result<()>;

    async fn search_articles(&self, filter: &ArticleFilter, page: Page)
    -> Result<Vec<ArticleDoc>>;

    /// Articles whose stored SimHash is within `max_hamming` of `simhash`.
    async fn find_by_simhash(
        &self,
        simhash: u64,
        max_hamming: u32,
        limit: usize,
    ) -> Result<Vec<CandidateRow>>;

    /// Articles sharing at least one LSH band hash, deduplicated.
    async fn find_by_lsh_bands(&self, bands: &[u64], limit: usize) -> Result<Vec<CandidateRow>>;

    /// MinHash signatures plus display fields for the given members.
    async fn get_member_sketches(&self, article_ids: &[String]) -> Result<Vec<MemberSketch>>;

    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<Cluster>>;

    async fn create_cluster(&self, cluster: &Cluster) -> Result<()>;

    /// Replace cluster state after admitting a member. Fails with
    /// `Error::Conflict` when `expected_version` is stale.
    async fn append_to_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()>;

    /// Replace cluster state after removing a member; deletes the cluster
    /// when the mutation leaves it empty.
    async fn delete_article_from_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()>;

    /// Cheap connectivity probe for health reporting.
    async fn ping(&self) -> Result<()>;
}
