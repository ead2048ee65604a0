pub(crate) mod articles;
pub(crate) mod clusters;
pub(crate) mod error;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod recheck;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/articles", post(articles::submit))
        .route("/api/v1/articles/recheck", post(recheck::schedule))
        .route("/api/v1/articles/{id}", get(articles::fetch))
        .route("/api/v1/articles/{id}/similar", get(articles::similar))
        .route("/api/v1/clusters", get(clusters::search))
        .route("/api/v1/clusters/{id}", get(clusters::fetch))
        .route("/api/v1/system/health", get(health::report))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(metrics::exporter))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
