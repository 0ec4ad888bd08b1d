use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde_json::json;

/// Error taxonomy shared by every service. Lower layers return a kind; the
/// handler boundary maps kind to HTTP status and a single-sentence message.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("requested dates are unavailable")]
    DateConflict(Vec<NaiveDate>),

    #[error("upstream service failure: {0}")]
    Upstream(String),

    #[error("upstream service timeout: {0}")]
    UpstreamTimeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServiceError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ServiceError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "authentication required" }),
            ),
            ServiceError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ServiceError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ServiceError::DateConflict(dates) => (
                StatusCode::CONFLICT,
                json!({ "error": "requested dates are unavailable", "conflicts": dates }),
            ),
            ServiceError::Upstream(msg) => {
                tracing::error!("upstream failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "upstream service failure" }),
                )
            }
            ServiceError::UpstreamTimeout(msg) => {
                tracing::error!("upstream timeout: {}", msg);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    json!({ "error": "upstream service timeout" }),
                )
            }
            ServiceError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
