//! Session views and trainer-side transitions.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use gauntlet_protocol::ReviewStatus;
use gauntlet_protocol::SessionSummary;
use gauntlet_review::TransitionOutcome;
use gauntlet_session::compute_diff;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

/// Session details for the trainer UI: review state, feedback, and the
/// submit/resubmit gates.
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let Some(meta) = state.repo.get_meta(&id).await? else {
        return Err(ApiError::not_found());
    };
    let review_count = state.repo.review_count(&id).await?;
    let reviews = state.repo.get_reviews(&id).await?;
    let feedback = state.repo.get_feedback(&id).await?;
    let can_submit =
        review_count >= 4 && meta.qc_done && meta.review_status == ReviewStatus::Draft;
    let can_resubmit =
        review_count >= 4 && meta.qc_done && meta.review_status == ReviewStatus::Returned;

    Ok(Json(json!({
        "session_id": &id,
        "status": state.repo.get_status(&id).await?,
        "total_hunts": meta.total_hunts,
        "completed_hunts": meta.completed_hunts,
        "breaks_found": meta.breaks_found,
        "config": state.repo.get_config(&id).await?.unwrap_or_default(),
        "results": state.repo.results(&id).await?,
        "human_reviews": reviews,
        "review_status": meta.review_status,
        "review_feedback": feedback,
        "can_submit_for_review": can_submit,
        "can_resubmit": can_resubmit,
        "qc_done": meta.qc_done,
        "review_round": meta.review_round,
        "max_rounds": state.pipeline.max_rounds(),
        "version": meta.version,
        "acknowledged_at": meta.acknowledged_at,
    })))
}

/// Full composite view for UI hydration.
pub async fn get_full_state(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    match state.repo.get_full_state(&id).await? {
        Some(full) => Ok(Json(serde_json::to_value(full).unwrap_or(Value::Null))),
        None => Err(ApiError::not_found()),
    }
}

/// Read-only snapshot of what the reviewer will see.
pub async fn preview(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let Some(full) = state.repo.get_full_state(&id).await? else {
        return Err(ApiError::not_found());
    };
    let qc_done = full.meta.qc_done;
    Ok(Json(json!({
        "session_id": id,
        "review_status": full.meta.review_status,
        "notebook": full.notebook,
        "human_reviews": full.reviews,
        "all_results": full.all_results,
        "meta": full.meta,
        "qc_done": qc_done,
    })))
}

fn transition_body(outcome: &TransitionOutcome) -> Value {
    json!({
        "ok": true,
        "review_status": outcome.review_status,
        "review_round": outcome.review_round,
        "version": outcome.version,
        "escalated": outcome.escalated,
    })
}

/// CAS `draft -> submitted`. Duplicate clicks are absorbed by the
/// `Idempotency-Key` header: the second request replays the first
/// response without a second transition.
pub async fn submit_for_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let idempotency_key = identity::idempotency_key(&headers);
    if let Some(key) = &idempotency_key
        && let Some(cached) = state.versioning.check_idempotency(key).await?
    {
        return Ok(Json(cached));
    }
    let outcome = state.pipeline.submit_for_review(&id).await?;
    let body = transition_body(&outcome);
    if let Some(key) = &idempotency_key {
        state.versioning.store_idempotency(key, &body).await?;
    }
    Ok(Json(body))
}

/// CAS `returned -> submitted`, or `-> escalated` past the round cap.
pub async fn resubmit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let idempotency_key = identity::idempotency_key(&headers);
    if let Some(key) = &idempotency_key
        && let Some(cached) = state.versioning.check_idempotency(key).await?
    {
        return Ok(Json(cached));
    }
    let outcome = state.pipeline.resubmit(&id).await?;
    let body = transition_body(&outcome);
    if let Some(key) = &idempotency_key {
        state.versioning.store_idempotency(key, &body).await?;
    }
    Ok(Json(body))
}

pub async fn acknowledge(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let ts = state.pipeline.acknowledge(&id).await?;
    Ok(Json(json!({ "ok": true, "acknowledged_at": ts })))
}

pub async fn mark_qc_done(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    state.pipeline.mark_qc_done(&id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub(crate) async fn versions_body(state: &AppState, id: &str) -> ApiResult {
    let versions = state.versioning.version_history(id).await?;
    Ok(Json(json!({ "session_id": id, "versions": versions })))
}

pub async fn versions(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    versions_body(&state, &id).await
}

#[derive(Deserialize)]
pub struct DiffQuery {
    pub v1: usize,
    pub v2: usize,
}

pub(crate) async fn diff_body(state: &AppState, id: &str, query: &DiffQuery) -> ApiResult {
    let versions = state.versioning.version_history(id).await?;
    let len = versions.len();
    for v in [query.v1, query.v2] {
        if v < 1 || v > len {
            return Err(ApiError::Validation(format!(
                "Version out of range. Available: 1-{len}"
            )));
        }
    }
    let r1 = versions[query.v1 - 1]
        .get("reviews")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let r2 = versions[query.v2 - 1]
        .get("reviews")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let changes = compute_diff(&r1, &r2);
    Ok(Json(json!({
        "v1": query.v1,
        "v2": query.v2,
        "changed_count": changes.len(),
        "changes": changes,
    })))
}

pub async fn diff(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> ApiResult {
    diff_body(&state, &id, &query).await
}

/// Sessions visible to the caller, grouped by review status.
/// super_admin sees all, admin their pods, reviewer their pod, trainer
/// only their own.
pub async fn trainer_queue(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let Some(email) = identity::trainer_identity(&headers) else {
        return Err(ApiError::Forbidden(
            "Missing identity: set X-Trainer-Email header".to_string(),
        ));
    };
    let Some(scope) = state.team.queue_scope(&email) else {
        return Err(ApiError::Forbidden(format!(
            "Unknown identity '{email}'. Contact admin to be added to the team directory."
        )));
    };
    let sessions: Vec<SessionSummary> = state
        .repo
        .list_sessions()
        .await?
        .into_iter()
        .filter(|summary| scope.permits(summary.trainer_email.as_deref()))
        .collect();

    let mut by_status: BTreeMap<String, Vec<&SessionSummary>> = BTreeMap::new();
    for summary in &sessions {
        by_status
            .entry(summary.review_status.to_string())
            .or_default()
            .push(summary);
    }
    let by_status = serde_json::to_value(&by_status).unwrap_or(Value::Null);
    Ok(Json(json!({
        "total": sessions.len(),
        "by_status": by_status,
        "sessions": sessions,
    })))
}

#[derive(Deserialize)]
pub struct InboxQuery {
    pub status: Option<String>,
}

/// Tasks needing trainer attention; defaults to returned + rejected.
pub async fn trainer_inbox(
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> ApiResult {
    let tasks = match &query.status {
        Some(raw) => {
            let status: ReviewStatus = raw
                .parse()
                .map_err(|_| ApiError::Validation(format!("Unknown review status '{raw}'")))?;
            state.repo.list_sessions_by_review_status(status).await?
        }
        None => {
            let mut tasks = state
                .repo
                .list_sessions_by_review_status(ReviewStatus::Returned)
                .await?;
            tasks.extend(
                state
                    .repo
                    .list_sessions_by_review_status(ReviewStatus::Rejected)
                    .await?,
            );
            tasks
        }
    };
    Ok(Json(json!({ "count": tasks.len(), "tasks": tasks })))
}
