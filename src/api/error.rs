//! HTTP error envelope: `{"error":{"code","message"},"trace_id"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::util::error::Error;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
    trace_id: String,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    trace_id: Uuid,
}

impl ApiError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_ARGUMENT",
            message: message.into(),
            trace_id: Uuid::new_v4(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match &error {
            Error::Input(_) => StatusCode::BAD_REQUEST,
            Error::ArticleNotFound(_) | Error::ClusterNotFound(_) | Error::ClusterPending(_) => {
                StatusCode::NOT_FOUND
            }
            Error::ArticleAlreadyExists(_) => StatusCode::CONFLICT,
            Error::RecheckRateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Conflict(_) | Error::Resource | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        Self {
            status,
            code: error.code(),
            message: error.to_string(),
            trace_id: Uuid::new_v4(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                trace_id = %self.trace_id,
                code = self.code,
                message = %self.message,
                "request failed"
            );
        }

        let body = Json(ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
            trace_id: self.trace_id.to_string(),
        });

        (self.status, body).into_response()
    }
}
