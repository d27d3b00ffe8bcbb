//! Per-session event log for live clients.
//!
//! Events append to a store stream with monotonic ids, trimmed to the
//! most recent window. Subscribers read with a cursor: first connect
//! starts after the latest entry, reconnects resume from the last id
//! the client saw, and `replay` fills the gap. `complete` and `error`
//! event types end a subscription.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use gauntlet_protocol::SessionEvent;
use gauntlet_store::EventId;
use gauntlet_store::KeyedStore;
use gauntlet_store::Result;
use gauntlet_store::StreamEntry;

use crate::keys;

/// Approximate per-session event window.
pub const EVENTS_MAXLEN: u64 = 200;

/// How long one blocking read waits before returning an empty batch so
/// the caller can check for client disconnect.
const BLOCK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EventLog {
    store: Arc<dyn KeyedStore>,
    ttl: Duration,
}

impl EventLog {
    pub fn new(store: Arc<dyn KeyedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Append an event; returns its stream id (the SSE event id).
    pub async fn publish(&self, session_id: &str, event: &SessionEvent) -> Result<EventId> {
        let key = keys::events(session_id);
        let fields = vec![
            ("event_type".to_string(), event.event_type.clone()),
            (
                "hunt_id".to_string(),
                event.hunt_id.map(|id| id.to_string()).unwrap_or_default(),
            ),
            ("data".to_string(), event.data.to_string()),
        ];
        let id = self.store.xadd(&key, fields, Some(EVENTS_MAXLEN)).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(id)
    }

    /// Events strictly after `last_id`, for reconnecting clients.
    pub async fn replay(
        &self,
        session_id: &str,
        last_id: EventId,
    ) -> Result<Vec<(EventId, SessionEvent)>> {
        let entries = self
            .store
            .xrange_after(&keys::events(session_id), Some(last_id))
            .await?;
        Ok(entries.iter().filter_map(parse_entry).collect())
    }

    /// Open a subscription. `last_id` of `None` means "latest only":
    /// the cursor starts after whatever is already in the stream.
    pub async fn subscribe(
        &self,
        session_id: &str,
        last_id: Option<EventId>,
    ) -> Result<EventSubscription> {
        let key = keys::events(session_id);
        let cursor = match last_id {
            Some(id) => Some(id),
            None => self
                .store
                .xrange_after(&key, None)
                .await?
                .last()
                .map(|entry| entry.id),
        };
        Ok(EventSubscription {
            store: Arc::clone(&self.store),
            key,
            cursor,
            done: false,
        })
    }

    pub async fn len(&self, session_id: &str) -> Result<u64> {
        self.store.xlen(&keys::events(session_id)).await
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.store.delete(&keys::events(session_id)).await?;
        Ok(())
    }
}

/// Cursor over a session's event stream.
///
/// Each `next_batch` blocks up to ~30 s; an empty batch is a timeout
/// tick (check the client connection and call again). After a terminal
/// event the subscription reports done and yields nothing further.
pub struct EventSubscription {
    store: Arc<dyn KeyedStore>,
    key: String,
    cursor: Option<EventId>,
    done: bool,
}

impl EventSubscription {
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub async fn next_batch(&mut self) -> Result<Vec<(EventId, SessionEvent)>> {
        if self.done {
            return Ok(Vec::new());
        }
        let entries = self
            .store
            .xread_block(&self.key, self.cursor, BLOCK_TIMEOUT)
            .await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in &entries {
            self.cursor = Some(entry.id);
            let Some((id, event)) = parse_entry(entry) else {
                continue;
            };
            let terminal = event.is_terminal();
            out.push((id, event));
            if terminal {
                self.done = true;
                break;
            }
        }
        Ok(out)
    }
}

fn parse_entry(entry: &StreamEntry) -> Option<(EventId, SessionEvent)> {
    let event_type = entry.fields.get("event_type")?.clone();
    let hunt_id = entry
        .fields
        .get("hunt_id")
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse().ok());
    let data = entry
        .fields
        .get("data")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(Value::Null);
    if event_type.is_empty() {
        warn!("dropping event with empty type at {}", entry.id);
        return None;
    }
    Some((entry.id, SessionEvent::new(event_type, hunt_id, data)))
}
