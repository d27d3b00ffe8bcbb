//! Reviewer actions: approve, return, reject, and the version history
//! views. All gated on a review-capable role.

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use gauntlet_protocol::ReviewerFeedback;

use crate::error::ApiError;
use crate::identity;
use crate::routes::session::DiffQuery;
use crate::routes::session::diff_body;
use crate::routes::session::versions_body;
use crate::state::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize, Default)]
pub struct ApproveBody {
    pub comment: Option<String>,
}

/// Atomically set `review_status` to approved. The task must be
/// submitted, or escalated with an admin caller.
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ApproveBody>>,
) -> ApiResult {
    let reviewer = identity::require_reviewer(&state.team, &headers)?;
    let comment = body.as_ref().and_then(|b| b.comment.as_deref());
    let outcome = state.pipeline.approve(&id, &reviewer, comment).await?;
    Ok(Json(
        json!({ "ok": true, "review_status": outcome.review_status }),
    ))
}

/// Save feedback and set `review_status` to returned; clears QC so the
/// trainer must re-run it before resubmitting.
pub async fn return_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ReviewerFeedback>>,
) -> ApiResult {
    let reviewer = identity::require_reviewer(&state.team, &headers)?;
    let feedback = body.as_ref().map(|b| &b.0);
    let outcome = state.pipeline.return_task(&id, &reviewer, feedback).await?;
    Ok(Json(
        json!({ "ok": true, "review_status": outcome.review_status }),
    ))
}

/// Atomically reject a task (terminal).
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ReviewerFeedback>>,
) -> ApiResult {
    let reviewer = identity::require_reviewer(&state.team, &headers)?;
    let feedback = body.as_ref().map(|b| &b.0);
    let outcome = state.pipeline.reject(&id, &reviewer, feedback).await?;
    Ok(Json(
        json!({ "ok": true, "review_status": outcome.review_status }),
    ))
}

/// Review-state snapshots captured at each submit/resubmit.
pub async fn versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    identity::require_reviewer(&state.team, &headers)?;
    versions_body(&state, &id).await
}

/// Field-level diff between two history snapshots.
pub async fn diff(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<DiffQuery>,
) -> ApiResult {
    identity::require_reviewer(&state.team, &headers)?;
    diff_body(&state, &id, &query).await
}
