use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;

use super::error::ApiError;

const CALLER_HEADER: &str = "x-caller-id";

#[derive(Debug, Deserialize)]
pub(crate) struct RecheckRequest {
    article_ids: Vec<String>,
    reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecheckResponse {
    accepted: usize,
    job_id: String,
}

/// `POST /api/v1/articles/recheck`.
pub(crate) async fn schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RecheckRequest>, JsonRejection>,
) -> Result<Json<RecheckResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| ApiError::invalid_argument(rejection.body_text()))?;

    if request.article_ids.is_empty() {
        return Err(ApiError::invalid_argument(
            "article_ids must not be empty",
        ));
    }
    if request.reason.trim().is_empty() {
        return Err(ApiError::invalid_argument("reason must not be empty"));
    }

    let caller = headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous");

    let receipt = state
        .recheck()
        .schedule(caller, &request.article_ids, &request.reason)
        .await?;

    Ok(Json(RecheckResponse {
        accepted: receipt.accepted,
        job_id: receipt.job_id,
    }))
}
