use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::app::AppState;
use crate::fingerprint;
use crate::queue::{JobType, NewJob};
use crate::store::models::{
    Article, ArticleDoc, ArticleState, Cluster, ClusterStatus, Tag, TermWeight, TopicRef,
};
use crate::util::error::Error;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitArticleRequest {
    article_id: String,
    title: String,
    content: String,
    publish_time: DateTime<Utc>,
    source: String,
    state: i16,
    top: u8,
    tags: Vec<Tag>,
    topic: Vec<TopicRef>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ArticleView {
    article_id: String,
    title: String,
    content: String,
    publish_time: DateTime<Utc>,
    source: String,
    state: i16,
    top: u8,
    tags: Vec<Tag>,
    topic: Vec<TopicRef>,
    cluster_id: Option<String>,
    cluster_status: &'static str,
    similarity_score: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ArticleView {
    fn from_article(article: &Article) -> Self {
        Self {
            article_id: article.article_id.clone(),
            title: article.title.clone(),
            content: article.content.clone(),
            publish_time: article.publish_time,
            source: article.source.clone(),
            state: article.state.as_i16(),
            top: u8::from(article.top),
            tags: article.tags.clone(),
            topic: article.topic.clone(),
            cluster_id: article.cluster_id.clone(),
            cluster_status: article.cluster_status.as_str(),
            similarity_score: article.similarity_score,
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ClusterSummary {
    cluster_id: String,
    size: i64,
    representative_article_id: String,
    top_terms: Vec<TermWeight>,
    last_updated: DateTime<Utc>,
}

impl ClusterSummary {
    pub(crate) fn from_cluster(cluster: &Cluster) -> Self {
        Self {
            cluster_id: cluster.cluster_id.clone(),
            size: cluster.size,
            representative_article_id: cluster.representative_article_id.clone(),
            top_terms: cluster.top_terms.clone(),
            last_updated: cluster.last_updated,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MemberSummary {
    article_id: String,
    title: String,
    source: String,
    publish_time: DateTime<Utc>,
    similarity_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ArticleResponse {
    article: ArticleView,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SimilarResponse {
    cluster: Option<ClusterSummary>,
    members: Vec<MemberSummary>,
}

fn validate(request: &SubmitArticleRequest, max_content_chars: usize) -> Result<(), ApiError> {
    if request.article_id.trim().is_empty() {
        return Err(ApiError::invalid_argument("article_id must not be empty"));
    }
    if request.title.trim().is_empty() {
        return Err(ApiError::invalid_argument("title must not be empty"));
    }
    if request.source.trim().is_empty() {
        return Err(ApiError::invalid_argument("source must not be empty"));
    }
    if request.content.chars().count() > max_content_chars {
        return Err(ApiError::invalid_argument(format!(
            "content exceeds {max_content_chars} characters"
        )));
    }
    if ArticleState::from_i16(request.state).is_none() {
        return Err(ApiError::invalid_argument("state must be one of 0, 1, 2"));
    }
    if request.top > 1 {
        return Err(ApiError::invalid_argument("top must be 0 or 1"));
    }
    Ok(())
}

/// `POST /api/v1/articles`: idempotent upsert plus similarity job.
pub(crate) async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<SubmitArticleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| ApiError::invalid_argument(rejection.body_text()))?;
    validate(&request, state.config().max_content_chars())?;

    if let Some(existing) = state.gateway().get_article(&request.article_id).await? {
        if existing.article.content == request.content {
            // Same payload resubmitted: the stored terminal state stands.
            return Ok(Json(json!({})));
        }
        return Err(Error::ArticleAlreadyExists(request.article_id).into());
    }

    let state_flag = ArticleState::from_i16(request.state)
        .ok_or_else(|| ApiError::invalid_argument("state must be one of 0, 1, 2"))?;
    let (fingerprint, _) = fingerprint::analyze(&request.content);
    let now = Utc::now();

    let doc = ArticleDoc {
        article: Article {
            article_id: request.article_id.clone(),
            title: request.title,
            content: request.content,
            publish_time: request.publish_time,
            source: request.source,
            state: state_flag,
            top: request.top == 1,
            tags: request.tags,
            topic: request.topic,
            cluster_id: None,
            cluster_status: ClusterStatus::Pending,
            similarity_score: None,
            created_at: now,
            updated_at: now,
        },
        fingerprint,
        version: 0,
    };

    state.gateway().upsert_article(&doc).await?;
    state
        .queue()
        .enqueue(NewJob {
            job_type: JobType::Ingest,
            article_id: request.article_id.clone(),
            run_at: now,
            max_attempts: state.config().job_max_attempts(),
        })
        .await?;

    state.telemetry().metrics().articles_submitted.inc();
    info!(article_id = %request.article_id, "article accepted");

    Ok(Json(json!({})))
}

/// `GET /api/v1/articles/{id}`: article plus cluster summary when matched.
pub(crate) async fn fetch(
    State(state): State<AppState>,
    Path(article_id): Path<String>,
) -> Result<Json<ArticleResponse>, ApiError> {
    let doc = state
        .gateway()
        .get_article(&article_id)
        .await?
        .ok_or(Error::ArticleNotFound(article_id))?;

    let cluster = match &doc.article.cluster_id {
        Some(cluster_id) if doc.article.cluster_status == ClusterStatus::Matched => state
            .gateway()
            .get_cluster(cluster_id)
            .await?
            .as_ref()
            .map(ClusterSummary::from_cluster),
        _ => None,
    };

    Ok(Json(ArticleResponse {
        article: ArticleView::from_article(&doc.article),
        cluster,
    }))
}

/// `GET /api/v1/articles/{id}/similar`: the article's cluster and member
/// summaries; `CLUSTER_PENDING` while the pipeline has not finished.
pub(crate) async fn similar(
    State(state): State<AppState>,
    Path(article_id): Path<String>,
) -> Result<Json<SimilarResponse>, ApiError> {
    let doc = state
        .gateway()
        .get_article(&article_id)
        .await?
        .ok_or_else(|| Error::ArticleNotFound(article_id.clone()))?;

    match doc.article.cluster_status {
        ClusterStatus::Pending => Err(Error::ClusterPending(article_id).into()),
        ClusterStatus::Unique => Ok(Json(SimilarResponse {
            cluster: None,
            members: vec![],
        })),
        ClusterStatus::Matched => {
            let cluster_id = doc
                .article
                .cluster_id
                .as_deref()
                .ok_or_else(|| Error::internal(anyhow::anyhow!("matched without cluster_id")))?;
            let cluster = state
                .gateway()
                .get_cluster(cluster_id)
                .await?
                .ok_or_else(|| Error::ClusterNotFound(cluster_id.to_string()))?;

            let members = member_summaries(&state, &cluster.article_ids).await?;
            Ok(Json(SimilarResponse {
                cluster: Some(ClusterSummary::from_cluster(&cluster)),
                members,
            }))
        }
    }
}

pub(crate) async fn member_summaries(
    state: &AppState,
    article_ids: &[String],
) -> Result<Vec<MemberSummary>, ApiError> {
    let mut members = Vec::with_capacity(article_ids.len());
    for member_id in article_ids {
        if let Some(member) = state.gateway().get_article(member_id).await? {
            members.push(MemberSummary {
                article_id: member.article.article_id,
                title: member.article.title,
                source: member.article.source,
                publish_time: member.article.publish_time,
                similarity_score: member.article.similarity_score,
            });
        }
    }
    Ok(members)
}
