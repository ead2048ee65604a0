//! In-memory index gateway with the same optimistic-versioning semantics as
//! the Postgres implementation. Test-only: backs the pipeline scenarios
//! without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::fingerprint::simhash;
use crate::util::error::{Error, Result};

use super::gateway::IndexGateway;
use super::models::{
    ArticleDoc, ArticleFilter, AssignmentWrite, CandidateRow, Cluster, ClusterMutation,
    ClusterStatus, MemberSketch, Page,
};

#[derive(Default)]
struct Inner {
    articles: HashMap<String, ArticleDoc>,
    clusters: HashMap<String, Cluster>,
}

#[derive(Default)]
pub(crate) struct MemoryIndexGateway {
    inner: Mutex<Inner>,
}

impl MemoryIndexGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cluster_count(&self) -> usize {
        self.inner.lock().expect("gateway mutex").clusters.len()
    }

    fn candidate_from(doc: &ArticleDoc) -> CandidateRow {
        CandidateRow {
            article_id: doc.article.article_id.clone(),
            simhash: doc.fingerprint.simhash,
            bands: doc.fingerprint.bands.clone(),
            cluster_id: doc.article.cluster_id.clone(),
            state: doc.article.state,
        }
    }
}

#[async_trait]
impl IndexGateway for MemoryIndexGateway {
    async fn upsert_article(&self, doc: &ArticleDoc) -> Result<()> {
        let mut inner = self.inner.lock().expect("gateway mutex");
        let mut stored = doc.clone();
        if let Some(existing) = inner.articles.get(&doc.article.article_id) {
            stored.version = existing.version + 1;
        } else {
            stored.version = 1;
        }
        inner.articles.insert(doc.article.article_id.clone(), stored);
        Ok(())
    }

    async fn get_article(&self, article_id: &str) -> Result<Option<ArticleDoc>> {
        let inner = self.inner.lock().expect("gateway mutex");
        Ok(inner.articles.get(article_id).cloned())
    }

    async fn update_assignment(
        &self,
        article_id: &str,
        assignment: &AssignmentWrite,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("gateway mutex");
        let doc = inner
            .articles
            .get_mut(article_id)
            .ok_or_else(|| Error::ArticleNotFound(article_id.to_string()))?;
        doc.article.cluster_id = assignment.cluster_id.clone();
        doc.article.cluster_status = assignment.cluster_status;
        doc.article.similarity_score = assignment.similarity_score;
        doc.article.updated_at = Utc::now();
        doc.version += 1;
        Ok(())
    }

    async fn claim_for_cluster(
        &self,
        article_id: &str,
        cluster_id: &str,
        score: f64,
        expected_version: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().expect("gateway mutex");
        let Some(doc) = inner.articles.get_mut(article_id) else {
            return Ok(false);
        };
        if doc.version != expected_version
            || doc.article.cluster_status == ClusterStatus::Matched
        {
            return Ok(false);
        }
        doc.article.cluster_id = Some(cluster_id.to_string());
        doc.article.cluster_status = ClusterStatus::Matched;
        doc.article.similarity_score = Some(score);
        doc.article.updated_at = Utc::now();
        doc.version += 1;
        Ok(true)
    }

    async fn mark_pending(&self, article_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("gateway mutex");
        let doc = inner
            .articles
            .get_mut(article_id)
            .ok_or_else(|| Error::ArticleNotFound(article_id.to_string()))?;
        doc.article.cluster_status = ClusterStatus::Pending;
        doc.article.updated_at = Utc::now();
        doc.version += 1;
        Ok(())
    }

    async fn search_articles(
        &self,
        filter: &ArticleFilter,
        page: Page,
    ) -> Result<Vec<ArticleDoc>> {
        let inner = self.inner.lock().expect("gateway mutex");
        let mut matched: Vec<ArticleDoc> = inner
            .articles
            .values()
            .filter(|doc| {
                let a = &doc.article;
                filter.source.as_ref().is_none_or(|s| &a.source == s)
                    && filter.state.is_none_or(|s| a.state == s)
                    && filter.cluster_status.is_none_or(|s| a.cluster_status == s)
                    && filter.published_since.is_none_or(|t| a.publish_time >= t)
                    && filter.published_until.is_none_or(|t| a.publish_time <= t)
                    && filter.top.is_none_or(|t| a.top == t)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.article
                .publish_time
                .cmp(&a.article.publish_time)
                .then_with(|| a.article.article_id.cmp(&b.article.article_id))
        });

        let offset = usize::try_from(page.offset).unwrap_or(0);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_by_simhash(
        &self,
        probe: u64,
        max_hamming: u32,
        limit: usize,
    ) -> Result<Vec<CandidateRow>> {
        let inner = self.inner.lock().expect("gateway mutex");
        Ok(inner
            .articles
            .values()
            .filter(|doc| simhash::hamming(doc.fingerprint.simhash, probe) <= max_hamming)
            .map(Self::candidate_from)
            .take(limit)
            .collect())
    }

    async fn find_by_lsh_bands(&self, bands: &[u64], limit: usize) -> Result<Vec<CandidateRow>> {
        let inner = self.inner.lock().expect("gateway mutex");
        Ok(inner
            .articles
            .values()
            .filter(|doc| {
                doc.fingerprint
                    .bands
                    .iter()
                    .any(|band| bands.contains(band))
            })
            .map(Self::candidate_from)
            .take(limit)
            .collect())
    }

    async fn get_member_sketches(&self, article_ids: &[String]) -> Result<Vec<MemberSketch>> {
        let inner = self.inner.lock().expect("gateway mutex");
        Ok(article_ids
            .iter()
            .filter_map(|id| inner.articles.get(id))
            .map(|doc| MemberSketch {
                article_id: doc.article.article_id.clone(),
                minhash: doc.fingerprint.minhash.clone(),
                title: doc.article.title.clone(),
                publish_time: doc.article.publish_time,
            })
            .collect())
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<Cluster>> {
        let inner = self.inner.lock().expect("gateway mutex");
        Ok(inner.clusters.get(cluster_id).cloned())
    }

    async fn create_cluster(&self, cluster: &Cluster) -> Result<()> {
        let mut inner = self.inner.lock().expect("gateway mutex");
        if inner.clusters.contains_key(&cluster.cluster_id) {
            return Err(Error::Conflict(cluster.cluster_id.clone()));
        }
        let mut stored = cluster.clone();
        stored.version = 1;
        inner.clusters.insert(cluster.cluster_id.clone(), stored);
        Ok(())
    }

    async fn append_to_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()> {
        self.replace_cluster(cluster_id, mutation, expected_version)
    }

    async fn delete_article_from_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()> {
        if mutation.size == 0 {
            let mut inner = self.inner.lock().expect("gateway mutex");
            let Some(cluster) = inner.clusters.get(cluster_id) else {
                return Err(Error::Conflict(cluster_id.to_string()));
            };
            if cluster.version != expected_version {
                return Err(Error::Conflict(cluster_id.to_string()));
            }
            inner.clusters.remove(cluster_id);
            return Ok(());
        }
        self.replace_cluster(cluster_id, mutation, expected_version)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

impl MemoryIndexGateway {
    fn replace_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("gateway mutex");
        let cluster = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| Error::Conflict(cluster_id.to_string()))?;
        if cluster.version != expected_version {
            return Err(Error::Conflict(cluster_id.to_string()));
        }
        cluster.article_ids = mutation.article_ids.clone();
        cluster.size = mutation.size;
        cluster.representative_article_id = mutation.representative_article_id.clone();
        cluster.representative_score = mutation.representative_score;
        cluster.centroid_minhash = mutation.centroid_minhash.clone();
        cluster.top_terms = mutation.top_terms.clone();
        cluster.last_updated = mutation.last_updated;
        cluster.version += 1;
        Ok(())
    }
}
