//! Server-Sent Events channels.
//!
//! Two per-session channels: a lightweight 2-second poll that emits
//! `{version, review_status}` whenever either changes (UI state sync,
//! decoupled from the event-log writer), and a replayable stream over
//! the append-only event log with `Last-Event-ID` style resumption.
//! Client disconnects drop the stream at its next await point.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use gauntlet_store::EventId;

use crate::state::AppState;

const CHANGE_FEED_TICK: Duration = Duration::from_secs(2);

/// Poll-based change feed: one event per observed change of `version`
/// or `review_status`.
pub async fn change_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let mut last_version: Option<u64> = None;
        let mut last_status = String::new();
        loop {
            let version = state.versioning.get_version(&id).await.unwrap_or(0);
            let status = state
                .repo
                .get_review_status(&id)
                .await
                .map(|status| status.to_string())
                .unwrap_or_default();
            if last_version != Some(version) || last_status != status {
                last_version = Some(version);
                last_status = status.clone();
                let data = json!({ "version": version, "review_status": status });
                yield Ok(Event::default().data(data.to_string()));
            }
            tokio::time::sleep(CHANGE_FEED_TICK).await;
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize, Default)]
pub struct StreamQuery {
    /// Resume after this event id; omitted means latest-only.
    pub last_event_id: Option<String>,
}

/// Replayable stream over the session's event log. Frames carry the
/// store-issued event id so clients can reconnect without gaps; the
/// stream ends after a terminal `complete`/`error` event.
pub async fn event_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let last_id = query
        .last_event_id
        .as_deref()
        .and_then(|raw| raw.parse::<EventId>().ok());

    let stream = async_stream::stream! {
        let mut subscription = match state.events.subscribe(&id, last_id).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!("event stream subscribe failed for {id}: {err}");
                return;
            }
        };
        while !subscription.is_done() {
            match subscription.next_batch().await {
                // Empty batches are block-timeout ticks; the keep-alive
                // covers the silence.
                Ok(batch) => {
                    for (event_id, event) in batch {
                        let data = serde_json::to_string(&event).unwrap_or_default();
                        yield Ok(Event::default().id(event_id.to_string()).data(data));
                    }
                }
                Err(err) => {
                    warn!("event stream read failed for {id}: {err}");
                    break;
                }
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
