use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::store::models::{ArticleFilter, ArticleState, ClusterStatus, Page, TermWeight};
use crate::util::error::Error;

use super::articles::{MemberSummary, member_summaries};
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub(crate) struct FetchClusterQuery {
    #[serde(default)]
    include_articles: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClusterResponse {
    cluster_id: String,
    article_ids: Vec<String>,
    size: i64,
    representative_article_id: String,
    top_terms: Vec<TermWeight>,
    last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    articles: Option<Vec<MemberSummary>>,
}

/// `GET /api/v1/clusters/{id}` with optional `?include_articles=true`.
pub(crate) async fn fetch(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Query(query): Query<FetchClusterQuery>,
) -> Result<Json<ClusterResponse>, ApiError> {
    let cluster = state
        .gateway()
        .get_cluster(&cluster_id)
        .await?
        .ok_or(Error::ClusterNotFound(cluster_id))?;

    let articles = if query.include_articles {
        Some(member_summaries(&state, &cluster.article_ids).await?)
    } else {
        None
    };

    Ok(Json(ClusterResponse {
        cluster_id: cluster.cluster_id,
        article_ids: cluster.article_ids,
        size: cluster.size,
        representative_article_id: cluster.representative_article_id,
        top_terms: cluster.top_terms,
        last_updated: cluster.last_updated,
        articles,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    source: Option<String>,
    state: Option<i16>,
    cluster_status: Option<String>,
    published_since: Option<DateTime<Utc>>,
    published_until: Option<DateTime<Utc>>,
    top: Option<u8>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchRow {
    article_id: String,
    similar_article_ids: Vec<String>,
}

/// `GET /api/v1/clusters`: filtered article search returning each article
/// with its cluster co-members.
pub(crate) async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchRow>>, ApiError> {
    let article_state = match query.state {
        Some(raw) => Some(
            ArticleState::from_i16(raw)
                .ok_or_else(|| ApiError::invalid_argument("state must be one of 0, 1, 2"))?,
        ),
        None => None,
    };
    let cluster_status = match query.cluster_status.as_deref() {
        Some(raw) => Some(ClusterStatus::from_str(raw).ok_or_else(|| {
            ApiError::invalid_argument("cluster_status must be pending, matched or unique")
        })?),
        None => None,
    };
    let top = match query.top {
        Some(0) => Some(false),
        Some(1) => Some(true),
        Some(_) => return Err(ApiError::invalid_argument("top must be 0 or 1")),
        None => None,
    };

    let filter = ArticleFilter {
        source: query.source,
        state: article_state,
        cluster_status,
        published_since: query.published_since,
        published_until: query.published_until,
        top,
    };
    let page = Page {
        limit: query.limit.unwrap_or(50).clamp(1, 500),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let docs = state.gateway().search_articles(&filter, page).await?;

    // One cluster lookup per distinct cluster, not per article.
    let mut memberships: HashMap<String, Vec<String>> = HashMap::new();
    let mut rows = Vec::with_capacity(docs.len());
    for doc in docs {
        let article_id = doc.article.article_id;
        let similar_article_ids = match doc.article.cluster_id {
            Some(cluster_id) => {
                let members = if let Some(known) = memberships.get(&cluster_id) {
                    known.clone()
                } else {
                    let fetched = state
                        .gateway()
                        .get_cluster(&cluster_id)
                        .await?
                        .map(|c| c.article_ids)
                        .unwrap_or_default();
                    memberships.insert(cluster_id.clone(), fetched.clone());
                    fetched
                };
                members
                    .into_iter()
                    .filter(|id| id != &article_id)
                    .collect()
            }
            None => vec![],
        };
        rows.push(SearchRow {
            article_id,
            similar_article_ids,
        });
    }

    Ok(Json(rows))
}
