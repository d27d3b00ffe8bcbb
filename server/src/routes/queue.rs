//! Reviewer queue, task-identity config, and the audit view.

use axum::Json;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use gauntlet_protocol::ReviewStatus;
use gauntlet_protocol::SessionSummary;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize, Default)]
pub struct QueueQuery {
    /// Include per-session summaries in the response.
    #[serde(default)]
    pub summaries: bool,
    /// Show every session instead of only submitted/returned.
    #[serde(default)]
    pub all_sessions: bool,
    pub status: Option<String>,
    /// Substring match on task id or session id.
    pub q: Option<String>,
}

/// Sessions available for review, scoped to the reviewer's pod (admins
/// see their pods, super-admins everything).
pub async fn get_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<QueueQuery>,
) -> ApiResult {
    let reviewer = identity::require_reviewer(&state.team, &headers)?;
    let Some(scope) = state.team.queue_scope(&reviewer) else {
        return Err(ApiError::Forbidden(format!(
            "Unknown identity '{reviewer}'."
        )));
    };

    let status_filter: Option<ReviewStatus> = match &query.status {
        Some(raw) => Some(
            raw.parse()
                .map_err(|_| ApiError::Validation(format!("Unknown review status '{raw}'")))?,
        ),
        None => None,
    };

    let sessions: Vec<SessionSummary> = state
        .repo
        .list_sessions()
        .await?
        .into_iter()
        .filter(|summary| scope.permits(summary.trainer_email.as_deref()))
        .filter(|summary| match status_filter {
            Some(status) => summary.review_status == status,
            None => {
                query.all_sessions
                    || matches!(
                        summary.review_status,
                        ReviewStatus::Submitted | ReviewStatus::Returned
                    )
            }
        })
        .filter(|summary| match &query.q {
            Some(needle) => {
                let needle = needle.to_lowercase();
                summary.session_id.to_lowercase().contains(&needle)
                    || summary.task_display_id.to_lowercase().contains(&needle)
            }
            None => true,
        })
        .collect();

    let session_ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
    let mut body = json!({ "sessions": session_ids, "count": session_ids.len() });
    if query.summaries || query.q.is_some() {
        body["summaries"] = serde_json::to_value(&sessions).unwrap_or(Value::Null);
    }
    Ok(Json(body))
}

/// The display-id label, so the frontend knows what to call the task id.
pub async fn task_identity_config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult {
    identity::require_reviewer(&state.team, &headers)?;
    Ok(Json(json!({
        "display_id_label": state.config.task_identity.display_id_label,
    })))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub session_id: String,
    #[serde(default = "default_audit_limit")]
    pub limit: usize,
}

fn default_audit_limit() -> usize {
    50
}

/// Recent audit entries for one session, newest first.
pub async fn get_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> ApiResult {
    identity::require_reviewer(&state.team, &headers)?;
    let entries = state
        .audit
        .entries(&query.session_id, query.limit.clamp(1, 200))
        .await?;
    Ok(Json(json!({ "count": entries.len(), "entries": entries })))
}
