use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use gauntlet_engine::SnapshotError;
use gauntlet_review::ReviewError;
use gauntlet_store::StoreError;

/// Error surface of the HTTP layer.
///
/// Bodies carry a `detail` message; conflicts also carry the observed
/// current state, and internal errors a correlation id that is logged
/// alongside the cause.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict {
        detail: String,
        current: Option<String>,
    },
    PreconditionFailed(String),
    Forbidden(String),
    Validation(String),
    /// Store or transport failure after retries; the client may try
    /// again later.
    Backend(String),
    Internal(String),
}

impl ApiError {
    pub fn not_found() -> Self {
        ApiError::NotFound("Session not found".to_string())
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotFound => ApiError::not_found(),
            ReviewError::Conflict { current, message } => ApiError::Conflict {
                detail: message,
                current: Some(current.to_string()),
            },
            ReviewError::PreconditionFailed(message) => ApiError::PreconditionFailed(message),
            ReviewError::Forbidden(message) => ApiError::Forbidden(message),
            ReviewError::Validation(message) => ApiError::Validation(message),
            ReviewError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(message) => ApiError::Backend(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(err: SnapshotError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(detail) => {
                (StatusCode::NOT_FOUND, json!({ "detail": detail }))
            }
            ApiError::Conflict { detail, current } => (
                StatusCode::CONFLICT,
                json!({ "detail": detail, "current_status": current }),
            ),
            ApiError::PreconditionFailed(detail) => {
                (StatusCode::BAD_REQUEST, json!({ "detail": detail }))
            }
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, json!({ "detail": detail })),
            ApiError::Validation(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "detail": detail }))
            }
            ApiError::Backend(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "detail": "Backend temporarily unavailable", "cause": detail }),
            ),
            ApiError::Internal(detail) => {
                let correlation_id = Uuid::new_v4().to_string();
                error!("internal error [{correlation_id}]: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": "Internal error", "correlation_id": correlation_id }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
