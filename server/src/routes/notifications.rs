//! Per-user notification routes. An absent identity header yields
//! empty results rather than an error; these are polled by the UI
//! before login state settles.

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize, Default)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let Some(email) = identity::trainer_identity(&headers) else {
        return Ok(Json(json!({ "notifications": [], "unread_count": 0 })));
    };
    let notifications = state
        .notifications
        .list(&email, query.unread_only, 50)
        .await?;
    let unread = state.notifications.unread_count(&email).await?;
    Ok(Json(json!({
        "notifications": notifications,
        "unread_count": unread,
    })))
}

pub async fn unread_count(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let Some(email) = identity::trainer_identity(&headers) else {
        return Ok(Json(json!({ "unread_count": 0 })));
    };
    let count = state.notifications.unread_count(&email).await?;
    Ok(Json(json!({ "unread_count": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let Some(email) = identity::trainer_identity(&headers) else {
        return Ok(Json(json!({ "ok": false })));
    };
    let found = state.notifications.mark_one_read(&email, &id).await?;
    Ok(Json(json!({ "ok": found })))
}

pub async fn mark_all_read(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let Some(email) = identity::trainer_identity(&headers) else {
        return Ok(Json(json!({ "ok": false, "count": 0 })));
    };
    let count = state.notifications.mark_all_read(&email).await?;
    Ok(Json(json!({ "ok": true, "count": count })))
}
