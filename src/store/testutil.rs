//! Builders shared by the gateway-backed tests.

use chrono::{TimeZone, Utc};

use crate::fingerprint;

use super::models::{Article, ArticleDoc, ArticleState, ClusterStatus};

/// Build a pending article document with a real fingerprint derived from
/// `content`. `minutes` offsets the publish time so ordering is controllable.
pub(crate) fn pending_doc(article_id: &str, content: &str, minutes: i64) -> ArticleDoc {
    let (fp, _) = fingerprint::analyze(content);
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    let publish_time = base + chrono::Duration::minutes(minutes);

    ArticleDoc {
        article: Article {
            article_id: article_id.to_string(),
            title: format!("title {article_id}"),
            content: content.to_string(),
            publish_time,
            source: "wire".to_string(),
            state: ArticleState::Visible,
            top: false,
            tags: vec![],
            topic: vec![],
            cluster_id: None,
            cluster_status: ClusterStatus::Pending,
            similarity_score: None,
            created_at: publish_time,
            updated_at: publish_time,
        },
        fingerprint: fp,
        version: 0,
    }
}
