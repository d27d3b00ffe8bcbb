//! HTTP surface of the review pipeline.
//!
//! A thin layer over the session services, the state machine, and the
//! rule engine: argument validation, trusted-header identity, role
//! scoping, idempotency lookup, SSE transport, and error-to-status
//! mapping. No business rules live here.

mod error;
mod identity;
mod routes;
mod state;

use axum::Router;
use axum::routing::get;
use axum::routing::post;

pub use error::ApiError;
pub use state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Session views and trainer transitions.
        .route("/api/session/{id}", get(routes::session::get_session))
        .route(
            "/api/session/{id}/full-state",
            get(routes::session::get_full_state),
        )
        .route("/api/session/{id}/preview", get(routes::session::preview))
        .route(
            "/api/session/{id}/submit-for-review",
            post(routes::session::submit_for_review),
        )
        .route("/api/session/{id}/resubmit", post(routes::session::resubmit))
        .route(
            "/api/session/{id}/acknowledge",
            post(routes::session::acknowledge),
        )
        .route(
            "/api/session/{id}/mark-qc-done",
            post(routes::session::mark_qc_done),
        )
        .route("/api/session/{id}/versions", get(routes::session::versions))
        .route("/api/session/{id}/diff", get(routes::session::diff))
        .route("/api/trainer-queue", get(routes::session::trainer_queue))
        .route("/api/trainer-inbox", get(routes::session::trainer_inbox))
        .route(
            "/api/session/bulk-resubmit",
            post(routes::bulk::bulk_resubmit),
        )
        // Reviewer actions.
        .route("/api/tasks/{id}/approve", post(routes::review_actions::approve))
        .route("/api/tasks/{id}/return", post(routes::review_actions::return_task))
        .route("/api/tasks/{id}/reject", post(routes::review_actions::reject))
        .route(
            "/api/tasks/{id}/versions",
            get(routes::review_actions::versions),
        )
        .route("/api/tasks/{id}/diff", get(routes::review_actions::diff))
        .route(
            "/api/tasks/bulk-approve",
            post(routes::bulk::bulk_approve),
        )
        .route("/api/queue", get(routes::queue::get_queue))
        .route(
            "/api/task-identity-config",
            get(routes::queue::task_identity_config),
        )
        .route("/api/audit", get(routes::queue::get_audit))
        // Presence and live channels.
        .route(
            "/api/presence/{id}",
            post(routes::presence::heartbeat)
                .get(routes::presence::who_is_viewing)
                .delete(routes::presence::leave),
        )
        .route("/api/session/{id}/events", get(routes::sse::change_feed))
        .route("/api/session/{id}/stream", get(routes::sse::event_stream))
        // Notifications.
        .route(
            "/api/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notifications::unread_count),
        )
        .route(
            "/api/notifications/{id}/read",
            post(routes::notifications::mark_read),
        )
        .route(
            "/api/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        // Agentic review.
        .route("/api/review", post(routes::agentic::run_review))
        .route("/api/review/stream", post(routes::agentic::stream_review))
        .with_state(state)
}
