//! Bulk actions with per-item outcomes.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize)]
pub struct BulkResubmitBody {
    pub session_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct BulkApproveBody {
    pub session_ids: Vec<String>,
    pub comment: Option<String>,
}

/// Resubmit multiple returned tasks; each must have QC done and an
/// acknowledged return. Partial success is the normal result shape.
pub async fn bulk_resubmit(
    State(state): State<AppState>,
    Json(body): Json<BulkResubmitBody>,
) -> ApiResult {
    let outcome = state.pipeline.bulk_resubmit(&body.session_ids).await?;
    Ok(Json(json!({
        "ok": true,
        "succeeded": outcome.succeeded,
        "failed": outcome.failed,
    })))
}

/// Approve multiple submitted tasks with an optional shared comment.
pub async fn bulk_approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BulkApproveBody>,
) -> ApiResult {
    let reviewer = identity::require_reviewer(&state.team, &headers)?;
    let outcome = state
        .pipeline
        .bulk_approve(&body.session_ids, &reviewer, body.comment.as_deref())
        .await?;
    Ok(Json(json!({
        "ok": true,
        "succeeded": outcome.succeeded,
        "failed": outcome.failed,
    })))
}
