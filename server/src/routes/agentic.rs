//! The agentic quality gate: run the rule engine over a session
//! snapshot, as one aggregated result or as a live event stream.

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;

use gauntlet_engine::build_snapshot;
use gauntlet_protocol::Checkpoint;
use gauntlet_protocol::SessionState;
use gauntlet_protocol::TaskSnapshot;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReviewRequest {
    /// Inline session record, or...
    pub session: Option<SessionState>,
    /// ...a stored session to load.
    pub session_id: Option<String>,
    pub checkpoint: Checkpoint,
    pub selected_hunt_ids: Option<Vec<u32>>,
}

async fn resolve_snapshot(state: &AppState, request: ReviewRequest) -> Result<TaskSnapshot, ApiError> {
    let session = match (request.session, &request.session_id) {
        (Some(session), _) => session,
        (None, Some(session_id)) => state
            .repo
            .get_full_state(session_id)
            .await?
            .ok_or_else(ApiError::not_found)?,
        (None, None) => {
            return Err(ApiError::Validation(
                "Provide either session or session_id".to_string(),
            ));
        }
    };
    if request.checkpoint == Checkpoint::Preflight
        && request
            .selected_hunt_ids
            .as_ref()
            .is_none_or(|ids| ids.len() != 4)
    {
        return Err(ApiError::Validation(
            "Preflight requires selected_hunt_ids with exactly 4 IDs".to_string(),
        ));
    }
    Ok(build_snapshot(
        &session,
        request.checkpoint,
        request.selected_hunt_ids.as_deref(),
    )?)
}

/// Run all applicable rules and return the aggregated `ReviewResult`.
pub async fn run_review(
    State(state): State<AppState>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<Value>, ApiError> {
    let snapshot = resolve_snapshot(&state, request).await?;
    let result = state.engine.run_review(&snapshot).await;
    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}

/// Streaming variant: rule-started / council / rule-completed events
/// as they happen, ending with the aggregate result.
pub async fn stream_review(
    State(state): State<AppState>,
    Json(request): Json<ReviewRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let snapshot = resolve_snapshot(&state, request).await?;
    let mut rx = state.engine.run_review_streaming(snapshot);
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
