//! Exact Jaccard verification of recalled candidates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::fingerprint::{ShingleSet, normalize};
use crate::store::gateway::IndexGateway;
use crate::util::error::Result;

use super::recall::Candidate;

#[derive(Debug, Clone, Copy)]
pub(crate) struct VerifierConfig {
    /// Inclusive similarity threshold for a match.
    pub(crate) threshold: f64,
    /// Candidate budget per article.
    pub(crate) max_candidates: usize,
    /// Wall-clock budget per article, checked between candidates.
    pub(crate) budget: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.80,
            max_candidates: 20,
            budget: Duration::from_millis(50),
        }
    }
}

/// A candidate that cleared the exact threshold.
///
/// Only the id and score are carried: the cluster manager re-reads each
/// match against current store state before acting, so any cluster fields
/// captured here would be stale by design.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VerifiedMatch {
    pub(crate) article_id: String,
    pub(crate) score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VerifyOutcome {
    /// Matches sorted by descending score.
    pub(crate) matches: Vec<VerifiedMatch>,
    /// True when the candidate or time budget cut the run short; the
    /// remainder of the candidate list was dropped.
    pub(crate) truncated: bool,
}

pub(crate) struct JaccardVerifier {
    gateway: Arc<dyn IndexGateway>,
    config: VerifierConfig,
}

impl JaccardVerifier {
    pub(crate) fn new(gateway: Arc<dyn IndexGateway>, config: VerifierConfig) -> Self {
        Self { gateway, config }
    }

    /// Verify candidates in proxy-score order against the probe shingles.
    ///
    /// Shingle sets are reconstructed from stored content on demand; they are
    /// not persisted. The loop checkpoints its budget between candidates so a
    /// long tail cannot stall the worker.
    pub(crate) async fn verify(
        &self,
        probe: &ShingleSet,
        candidates: &[Candidate],
    ) -> Result<VerifyOutcome> {
        let started = Instant::now();
        let mut matches = Vec::new();
        let mut processed = 0usize;

        for candidate in candidates {
            if processed >= self.config.max_candidates || started.elapsed() >= self.config.budget {
                debug!(
                    processed,
                    dropped = candidates.len() - processed,
                    "verification budget exhausted"
                );
                return Ok(VerifyOutcome {
                    matches: sorted(matches),
                    truncated: true,
                });
            }
            processed += 1;

            let Some(doc) = self.gateway.get_article(&candidate.article_id).await? else {
                continue;
            };

            let candidate_shingles = ShingleSet::build(&normalize(&doc.article.content));
            let score = probe.jaccard(&candidate_shingles);
            if score >= self.config.threshold {
                matches.push(VerifiedMatch {
                    article_id: doc.article.article_id,
                    score,
                });
            }
        }

        Ok(VerifyOutcome {
            matches: sorted(matches),
            truncated: false,
        })
    }
}

fn sorted(mut matches: Vec<VerifiedMatch>) -> Vec<VerifiedMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.article_id.cmp(&b.article_id))
    });
    matches
}
