//! Cluster assignment: the only code allowed to create, grow, shrink or
//! merge-log clusters.
//!
//! Two contracts hold under concurrency:
//!
//! * **Single winner**: each article ends in exactly one terminal state and
//!   is never observable in two clusters. Peers pulled into a fresh cluster
//!   are claimed with a version-checked write first; losing a claim reruns
//!   the decision against fresh state.
//! * **Monotone cluster state**: size only shrinks via explicit removal,
//!   the centroid is an elementwise running minimum, and `last_updated`
//!   never goes backwards.
//!
//! All cluster writes are optimistic: on version conflict the manager
//! re-reads, recomputes and retries a bounded number of times before
//! surfacing `Error::Conflict` for requeue.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fingerprint::{minhash, normalize};
use crate::observability::metrics::Metrics;
use crate::store::gateway::IndexGateway;
use crate::store::models::{
    ArticleDoc, Cluster, ClusterMutation, ClusterStatus, MemberSketch, TermWeight,
};
use crate::util::error::{Error, Result};

use super::verify::VerifiedMatch;

const TOP_TERM_COUNT: usize = 10;

/// Terminal decision for one article.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Assignment {
    Unique,
    Matched { cluster_id: String, score: f64 },
}

pub(crate) struct ClusterManager {
    gateway: Arc<dyn IndexGateway>,
    metrics: Arc<Metrics>,
    max_retries: usize,
}

/// A verified match re-read against current store state.
struct FreshMatch {
    article_id: String,
    cluster_id: Option<String>,
    cluster_status: ClusterStatus,
    score: f64,
    article_version: i64,
}

impl ClusterManager {
    pub(crate) fn new(
        gateway: Arc<dyn IndexGateway>,
        metrics: Arc<Metrics>,
        max_retries: usize,
    ) -> Self {
        Self {
            gateway,
            metrics,
            max_retries,
        }
    }

    /// Decide and apply the cluster side of an article's terminal state.
    ///
    /// The verified match set is fixed; cluster state is re-read on every
    /// retry.
    pub(crate) async fn assign(
        &self,
        doc: &ArticleDoc,
        matches: &[VerifiedMatch],
    ) -> Result<Assignment> {
        if matches.is_empty() {
            return Ok(Assignment::Unique);
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.try_assign(doc, matches).await {
                Err(Error::Conflict(detail)) => {
                    self.metrics.cluster_conflicts.inc();
                    debug!(
                        article_id = %doc.article.article_id,
                        attempt,
                        %detail,
                        "cluster write conflict, rereading"
                    );
                    last_error = Some(Error::Conflict(detail));
                }
                other => return other,
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Conflict(doc.article.article_id.clone())))
    }

    /// Remove an article from the cluster it previously belonged to, fixing
    /// centroid and representative, and deleting the cluster when it empties.
    pub(crate) async fn remove_member(&self, cluster_id: &str, article_id: &str) -> Result<()> {
        for _attempt in 0..=self.max_retries {
            let Some(cluster) = self.gateway.get_cluster(cluster_id).await? else {
                return Ok(());
            };
            if !cluster.article_ids.iter().any(|id| id == article_id) {
                return Ok(());
            }

            let remaining: Vec<String> = cluster
                .article_ids
                .iter()
                .filter(|id| id.as_str() != article_id)
                .cloned()
                .collect();

            let mutation = if remaining.is_empty() {
                ClusterMutation {
                    article_ids: vec![],
                    size: 0,
                    representative_article_id: cluster.representative_article_id.clone(),
                    representative_score: 0.0,
                    centroid_minhash: cluster.centroid_minhash.clone(),
                    top_terms: vec![],
                    last_updated: Utc::now(),
                }
            } else {
                let sketches = self.gateway.get_member_sketches(&remaining).await?;
                let (representative, representative_score) = full_representative(&sketches);
                ClusterMutation {
                    article_ids: remaining,
                    size: sketches.len() as i64,
                    representative_article_id: representative,
                    representative_score,
                    centroid_minhash: centroid_of(&sketches),
                    top_terms: top_terms_of(sketches.iter().map(|s| s.title.as_str())),
                    last_updated: Utc::now(),
                }
            };

            match self
                .gateway
                .delete_article_from_cluster(cluster_id, &mutation, cluster.version)
                .await
            {
                Ok(()) => {
                    info!(%cluster_id, %article_id, size = mutation.size, "member removed");
                    return Ok(());
                }
                Err(Error::Conflict(_)) => {
                    self.metrics.cluster_conflicts.inc();
                }
                Err(other) => return Err(other),
            }
        }

        Err(Error::Conflict(cluster_id.to_string()))
    }

    async fn try_assign(&self, doc: &ArticleDoc, matches: &[VerifiedMatch]) -> Result<Assignment> {
        let fresh = self.refresh_matches(matches).await?;

        let clusters: BTreeSet<&str> = fresh
            .iter()
            .filter(|m| m.cluster_status == ClusterStatus::Matched)
            .filter_map(|m| m.cluster_id.as_deref())
            .collect();

        if clusters.is_empty() {
            return self.create_cluster_with_peers(doc, &fresh).await;
        }

        if clusters.len() >= 2 {
            // Never merge automatically: transitively-dissimilar articles
            // would end up sharing a cluster. Flag for manual recheck.
            self.metrics.merge_candidates.inc();
            warn!(
                article_id = %doc.article.article_id,
                clusters = ?clusters,
                "merge candidate: article matches multiple clusters"
            );
        }

        let target = fresh
            .iter()
            .filter(|m| m.cluster_status == ClusterStatus::Matched)
            .find(|m| m.cluster_id.is_some())
            .and_then(|m| m.cluster_id.as_deref().map(|id| (id, m.score)));
        let Some((target_id, score)) = target else {
            return Err(Error::Conflict(doc.article.article_id.clone()));
        };

        self.append_member(doc, target_id, score).await
    }

    /// Re-read every verified match so retry rounds observe current cluster
    /// membership. Ordering by descending score is preserved.
    async fn refresh_matches(&self, matches: &[VerifiedMatch]) -> Result<Vec<FreshMatch>> {
        let reads = matches
            .iter()
            .map(|m| self.gateway.get_article(&m.article_id));
        let docs = try_join_all(reads).await?;

        let mut scores: FxHashMap<&str, f64> = FxHashMap::default();
        for m in matches {
            scores.insert(m.article_id.as_str(), m.score);
        }

        let mut fresh: Vec<FreshMatch> = docs
            .into_iter()
            .flatten()
            .map(|doc| FreshMatch {
                score: scores
                    .get(doc.article.article_id.as_str())
                    .copied()
                    .unwrap_or(0.0),
                article_id: doc.article.article_id,
                cluster_id: doc.article.cluster_id,
                cluster_status: doc.article.cluster_status,
                article_version: doc.version,
            })
            .collect();

        fresh.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.article_id.cmp(&b.article_id))
        });
        Ok(fresh)
    }

    /// No match has a cluster yet: open a new one with the current article
    /// plus every match we can still claim.
    async fn create_cluster_with_peers(
        &self,
        doc: &ArticleDoc,
        fresh: &[FreshMatch],
    ) -> Result<Assignment> {
        let cluster_id = Uuid::new_v4().simple().to_string();

        let mut claimed: Vec<&FreshMatch> = Vec::new();
        for peer in fresh
            .iter()
            .filter(|m| m.cluster_status != ClusterStatus::Matched)
        {
            if self
                .gateway
                .claim_for_cluster(&peer.article_id, &cluster_id, peer.score, peer.article_version)
                .await?
            {
                claimed.push(peer);
            }
        }

        if claimed.is_empty() {
            // Every peer was claimed by a concurrent assignment; their
            // clusters become visible on the next read.
            return Err(Error::Conflict(doc.article.article_id.clone()));
        }

        let peer_ids: Vec<String> = claimed.iter().map(|p| p.article_id.clone()).collect();
        let mut sketches = self.gateway.get_member_sketches(&peer_ids).await?;
        sketches.sort_by(|a, b| {
            a.publish_time
                .cmp(&b.publish_time)
                .then_with(|| a.article_id.cmp(&b.article_id))
        });

        // Assignment order: previously-ingested peers first, current last.
        let mut article_ids: Vec<String> =
            sketches.iter().map(|s| s.article_id.clone()).collect();
        article_ids.push(doc.article.article_id.clone());

        let mut all_sketches = sketches;
        all_sketches.push(MemberSketch {
            article_id: doc.article.article_id.clone(),
            minhash: doc.fingerprint.minhash.clone(),
            title: doc.article.title.clone(),
            publish_time: doc.article.publish_time,
        });

        // Representative: the highest-similarity peer of the new article.
        let best_peer = claimed
            .first()
            .expect("claimed is non-empty")
            .article_id
            .clone();
        let representative_score = average_similarity(&best_peer, &all_sketches);

        let cluster = Cluster {
            cluster_id: cluster_id.clone(),
            size: article_ids.len() as i64,
            representative_article_id: best_peer,
            representative_score,
            centroid_minhash: centroid_of(&all_sketches),
            top_terms: top_terms_of(all_sketches.iter().map(|s| s.title.as_str())),
            last_updated: Utc::now(),
            version: 1,
            article_ids,
        };

        self.gateway.create_cluster(&cluster).await?;
        self.metrics.clusters_created.inc();
        info!(
            cluster_id = %cluster.cluster_id,
            size = cluster.size,
            article_id = %doc.article.article_id,
            "cluster created"
        );

        let score = claimed.first().map_or(0.0, |p| p.score);
        Ok(Assignment::Matched { cluster_id, score })
    }

    /// Append the article to an existing cluster with a version-checked
    /// write.
    async fn append_member(
        &self,
        doc: &ArticleDoc,
        cluster_id: &str,
        score: f64,
    ) -> Result<Assignment> {
        let Some(cluster) = self.gateway.get_cluster(cluster_id).await? else {
            // The matched article pointed at a cluster that no longer
            // exists; re-read and decide again.
            return Err(Error::Conflict(cluster_id.to_string()));
        };

        if cluster
            .article_ids
            .iter()
            .any(|id| id == &doc.article.article_id)
        {
            // Redelivered job: the append already happened.
            return Ok(Assignment::Matched {
                cluster_id: cluster_id.to_string(),
                score,
            });
        }

        let sketches = self.gateway.get_member_sketches(&cluster.article_ids).await?;

        // Representative maintenance is bounded: the incoming member takes
        // over only when its estimated average similarity beats the cached
        // score of the current representative.
        let incoming_avg = average_estimate(&doc.fingerprint.minhash, &sketches);
        let (representative_article_id, representative_score, top_terms) =
            if incoming_avg > cluster.representative_score {
                let titles: Vec<&str> = sketches
                    .iter()
                    .map(|s| s.title.as_str())
                    .chain(std::iter::once(doc.article.title.as_str()))
                    .collect();
                (
                    doc.article.article_id.clone(),
                    incoming_avg,
                    top_terms_of(titles.into_iter()),
                )
            } else {
                (
                    cluster.representative_article_id.clone(),
                    cluster.representative_score,
                    cluster.top_terms.clone(),
                )
            };

        let mut article_ids = cluster.article_ids.clone();
        article_ids.push(doc.article.article_id.clone());

        let mutation = ClusterMutation {
            size: article_ids.len() as i64,
            article_ids,
            representative_article_id,
            representative_score,
            centroid_minhash: minhash::elementwise_min(
                &cluster.centroid_minhash,
                &doc.fingerprint.minhash,
            ),
            top_terms,
            last_updated: Utc::now(),
        };

        self.gateway
            .append_to_cluster(cluster_id, &mutation, cluster.version)
            .await?;

        info!(
            %cluster_id,
            article_id = %doc.article.article_id,
            size = mutation.size,
            score,
            "member appended"
        );

        Ok(Assignment::Matched {
            cluster_id: cluster_id.to_string(),
            score,
        })
    }
}

/// Average estimated similarity of one signature to a set of member
/// sketches.
fn average_estimate(signature: &[u64], members: &[MemberSketch]) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    let total: f64 = members
        .iter()
        .map(|m| minhash::estimate_similarity(signature, &m.minhash))
        .sum();
    total / members.len() as f64
}

/// Average estimated similarity of one member to all the others.
fn average_similarity(article_id: &str, members: &[MemberSketch]) -> f64 {
    let Some(member) = members.iter().find(|m| m.article_id == article_id) else {
        return 0.0;
    };
    let others: Vec<MemberSketch> = members
        .iter()
        .filter(|m| m.article_id != article_id)
        .cloned()
        .collect();
    average_estimate(&member.minhash, &others)
}

/// Exhaustive representative selection: maximum average similarity to the
/// rest, ties broken by earliest publish time, then lowest article id.
fn full_representative(members: &[MemberSketch]) -> (String, f64) {
    let mut best: Option<(&MemberSketch, f64)> = None;
    for member in members {
        let avg = average_similarity(&member.article_id, members);
        let better = match best {
            None => true,
            Some((current, current_avg)) => match avg.partial_cmp(&current_avg) {
                Some(std::cmp::Ordering::Greater) => true,
                Some(std::cmp::Ordering::Equal) => {
                    (member.publish_time, &member.article_id)
                        < (current.publish_time, &current.article_id)
                }
                _ => false,
            },
        };
        if better {
            best = Some((member, avg));
        }
    }
    best.map_or_else(
        || (String::new(), 0.0),
        |(member, avg)| (member.article_id.clone(), avg),
    )
}

fn centroid_of(members: &[MemberSketch]) -> Vec<u64> {
    let mut centroid = vec![u64::MAX; minhash::NUM_PERMUTATIONS];
    for member in members {
        centroid = minhash::elementwise_min(&centroid, &member.minhash);
    }
    centroid
}

/// Derive display terms from member titles: whitespace terms of the
/// normalized titles, weighted by relative frequency.
fn top_terms_of<'a>(titles: impl Iterator<Item = &'a str>) -> Vec<TermWeight> {
    let mut counts: FxHashMap<String, u32> = FxHashMap::default();
    let mut total = 0u32;
    for title in titles {
        for term in normalize(title).split_whitespace() {
            *counts.entry(term.to_string()).or_insert(0) += 1;
            total += 1;
        }
    }
    if total == 0 {
        return vec![];
    }

    let mut terms: Vec<(String, u32)> = counts.into_iter().collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms
        .into_iter()
        .take(TOP_TERM_COUNT)
        .map(|(term, count)| TermWeight {
            term,
            weight: f64::from(count) / f64::from(total),
        })
        .collect()
}
