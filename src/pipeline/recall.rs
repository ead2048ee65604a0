//! Candidate recall: bounded approximate retrieval ahead of exact
//! verification.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::fingerprint::{Fingerprint, simhash};
use crate::store::gateway::IndexGateway;
use crate::store::models::{ArticleState, CandidateRow};
use crate::util::error::Result;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RecallConfig {
    /// Maximum candidates returned (K).
    pub(crate) limit: usize,
    /// Maximum candidates admitted per existing cluster, so one large
    /// cluster cannot monopolize the budget.
    pub(crate) per_cluster_cap: usize,
    pub(crate) max_hamming: u32,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            per_cluster_cap: 3,
            max_hamming: simhash::DUPLICATE_HAMMING,
        }
    }
}

/// A recalled candidate with its proxy ranking signals.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub(crate) article_id: String,
    pub(crate) cluster_id: Option<String>,
    pub(crate) matching_bands: u32,
    pub(crate) hamming: u32,
}

pub(crate) struct CandidateRecall {
    gateway: Arc<dyn IndexGateway>,
    config: RecallConfig,
}

impl CandidateRecall {
    pub(crate) fn new(gateway: Arc<dyn IndexGateway>, config: RecallConfig) -> Self {
        Self { gateway, config }
    }

    /// Return up to K candidate articles for the probe fingerprint, ranked
    /// by matching LSH band count with SimHash closeness as tiebreak.
    pub(crate) async fn recall(
        &self,
        probe_id: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<Candidate>> {
        // Overfetch so that dedup, deleted-state and per-cluster filtering
        // still leave a full K.
        let fetch_limit = self.config.limit.saturating_mul(4);

        let (simhash_hits, band_hits) = tokio::join!(
            self.gateway
                .find_by_simhash(fingerprint.simhash, self.config.max_hamming, fetch_limit),
            self.gateway.find_by_lsh_bands(&fingerprint.bands, fetch_limit),
        );

        let mut merged: FxHashMap<String, CandidateRow> = FxHashMap::default();
        for row in simhash_hits?.into_iter().chain(band_hits?) {
            merged.entry(row.article_id.clone()).or_insert(row);
        }

        let mut ranked: Vec<Candidate> = merged
            .into_values()
            .filter(|row| row.article_id != probe_id && row.state != ArticleState::Deleted)
            .map(|row| {
                let matching_bands = row
                    .bands
                    .iter()
                    .zip(fingerprint.bands.iter())
                    .filter(|(a, b)| a == b)
                    .count() as u32;
                Candidate {
                    hamming: simhash::hamming(row.simhash, fingerprint.simhash),
                    article_id: row.article_id,
                    cluster_id: row.cluster_id,
                    matching_bands,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.matching_bands
                .cmp(&a.matching_bands)
                .then_with(|| a.hamming.cmp(&b.hamming))
                .then_with(|| a.article_id.cmp(&b.article_id))
        });

        let mut per_cluster: FxHashMap<String, usize> = FxHashMap::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut out = Vec::with_capacity(self.config.limit);
        for candidate in ranked {
            if !seen.insert(candidate.article_id.clone()) {
                continue;
            }
            if let Some(cluster_id) = &candidate.cluster_id {
                let admitted = per_cluster.entry(cluster_id.clone()).or_insert(0);
                if *admitted >= self.config.per_cluster_cap {
                    continue;
                }
                *admitted += 1;
            }
            out.push(candidate);
            if out.len() >= self.config.limit {
                break;
            }
        }

        Ok(out)
    }
}
