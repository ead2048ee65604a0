use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Visibility state of an article, as provided by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ArticleState {
    Invisible,
    Visible,
    Deleted,
}

impl ArticleState {
    pub(crate) fn as_i16(self) -> i16 {
        match self {
            ArticleState::Invisible => 0,
            ArticleState::Visible => 1,
            ArticleState::Deleted => 2,
        }
    }

    pub(crate) fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(ArticleState::Invisible),
            1 => Some(ArticleState::Visible),
            2 => Some(ArticleState::Deleted),
            _ => None,
        }
    }
}

/// Where an article stands in the similarity pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ClusterStatus {
    Pending,
    Matched,
    Unique,
}

impl ClusterStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ClusterStatus::Pending => "pending",
            ClusterStatus::Matched => "matched",
            ClusterStatus::Unique => "unique",
        }
    }

    pub(crate) fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ClusterStatus::Pending),
            "matched" => Some(ClusterStatus::Matched),
            "unique" => Some(ClusterStatus::Unique),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Tag {
    pub(crate) id: i64,
    pub(crate) name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TopicRef {
    pub(crate) id: String,
    pub(crate) name: String,
}

/// An ingested article. `cluster_id` is set iff `cluster_status` is
/// `matched`; `similarity_score` likewise.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Article {
    pub(crate) article_id: String,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) publish_time: DateTime<Utc>,
    pub(crate) source: String,
    pub(crate) state: ArticleState,
    pub(crate) top: bool,
    pub(crate) tags: Vec<Tag>,
    pub(crate) topic: Vec<TopicRef>,
    pub(crate) cluster_id: Option<String>,
    pub(crate) cluster_status: ClusterStatus,
    pub(crate) similarity_score: Option<f64>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

/// Article plus its stored fingerprint and the document version used for
/// optimistic writes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArticleDoc {
    pub(crate) article: Article,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TermWeight {
    pub(crate) term: String,
    pub(crate) weight: f64,
}

/// A cluster of mutually near-duplicate articles.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cluster {
    pub(crate) cluster_id: String,
    /// Insertion order equals assignment order.
    pub(crate) article_ids: Vec<String>,
    pub(crate) size: i64,
    pub(crate) representative_article_id: String,
    /// Cached average estimated similarity of the representative to the
    /// other members; the bar an incoming member has to clear to take over.
    pub(crate) representative_score: f64,
    /// Elementwise minimum over member MinHash signatures.
    pub(crate) centroid_minhash: Vec<u64>,
    pub(crate) top_terms: Vec<TermWeight>,
    pub(crate) last_updated: DateTime<Utc>,
    pub(crate) version: i64,
}

/// Full replacement state for a version-checked cluster write.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClusterMutation {
    pub(crate) article_ids: Vec<String>,
    pub(crate) size: i64,
    pub(crate) representative_article_id: String,
    pub(crate) representative_score: f64,
    pub(crate) centroid_minhash: Vec<u64>,
    pub(crate) top_terms: Vec<TermWeight>,
    pub(crate) last_updated: DateTime<Utc>,
}

/// Terminal-state write-back for one article.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssignmentWrite {
    pub(crate) cluster_id: Option<String>,
    pub(crate) cluster_status: ClusterStatus,
    pub(crate) similarity_score: Option<f64>,
}

impl AssignmentWrite {
    pub(crate) fn unique() -> Self {
        Self {
            cluster_id: None,
            cluster_status: ClusterStatus::Unique,
            similarity_score: None,
        }
    }

    pub(crate) fn matched(cluster_id: String, score: f64) -> Self {
        Self {
            cluster_id: Some(cluster_id),
            cluster_status: ClusterStatus::Matched,
            similarity_score: Some(score),
        }
    }
}

/// Slim row returned by the SimHash and LSH-band lookups; enough for the
/// recall stage to rank and filter without loading full documents.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CandidateRow {
    pub(crate) article_id: String,
    pub(crate) simhash: u64,
    pub(crate) bands: Vec<u64>,
    pub(crate) cluster_id: Option<String>,
    pub(crate) state: ArticleState,
}

/// Per-member sketch used for centroid and representative maintenance.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MemberSketch {
    pub(crate) article_id: String,
    pub(crate) minhash: Vec<u64>,
    pub(crate) title: String,
    pub(crate) publish_time: DateTime<Utc>,
}

/// Filter for the article search backing the query API.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ArticleFilter {
    pub(crate) source: Option<String>,
    pub(crate) state: Option<ArticleState>,
    pub(crate) cluster_status: Option<ClusterStatus>,
    pub(crate) published_since: Option<DateTime<Utc>>,
    pub(crate) published_until: Option<DateTime<Utc>>,
    pub(crate) top: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Page {
    pub(crate) limit: i64,
    pub(crate) offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}
