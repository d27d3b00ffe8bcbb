//! Viewer presence: heartbeat, listing, and leave.

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::Value;
use serde_json::json;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

/// Record that the caller is viewing/editing this session. Clients
/// heartbeat at a cadence shorter than the presence TTL.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let Some(email) = identity::identity(&headers) else {
        return Err(ApiError::PreconditionFailed(
            "X-Trainer-Email header required".to_string(),
        ));
    };
    let role = state
        .team
        .role_of(&email)
        .map(|role| role.to_string())
        .unwrap_or_else(|| "trainer".to_string());
    state.presence.heartbeat(&id, &email, &role, "editing").await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn who_is_viewing(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let viewers = state.presence.viewers(&id).await?;
    Ok(Json(json!({ "session_id": id, "viewers": viewers })))
}

pub async fn leave(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    if let Some(email) = identity::identity(&headers) {
        state.presence.leave(&id, &email).await?;
    }
    Ok(Json(json!({ "ok": true })))
}
