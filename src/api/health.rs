use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct ComponentStatus {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthReport {
    status: &'static str,
    index_gateway: ComponentStatus,
    queue: ComponentStatus,
}

/// `GET /api/v1/system/health`: component statuses; 503 when degraded.
pub(crate) async fn report(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    let index_gateway = match state.gateway().ping().await {
        Ok(()) => ComponentStatus {
            status: "ok",
            detail: None,
            depth: None,
        },
        Err(err) => {
            error!(error = %err, "index gateway health check failed");
            ComponentStatus {
                status: "unavailable",
                detail: Some(format!("{err:#}")),
                depth: None,
            }
        }
    };

    let queue = match state.queue().depth().await {
        Ok(depth) => ComponentStatus {
            status: "ok",
            detail: None,
            depth: Some(depth),
        },
        Err(err) => {
            error!(error = %err, "queue health check failed");
            ComponentStatus {
                status: "unavailable",
                detail: Some(format!("{err:#}")),
                depth: None,
            }
        }
    };

    let degraded = index_gateway.status != "ok" || queue.status != "ok";
    let report = HealthReport {
        status: if degraded { "degraded" } else { "ok" },
        index_gateway,
        queue,
    };

    if degraded {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(report)))
    } else {
        Ok(Json(report))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ProbeReport {
    status: &'static str,
}

pub(crate) async fn live() -> Json<ProbeReport> {
    Json(ProbeReport { status: "live" })
}

pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ProbeReport>, (StatusCode, Json<ProbeReport>)> {
    if let Err(err) = state.gateway().ping().await {
        error!(error = %err, "readiness check failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeReport {
                status: "degraded",
            }),
        ));
    }
    Ok(Json(ProbeReport { status: "ready" }))
}
