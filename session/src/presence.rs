//! Viewer presence: who has a session open right now.
//!
//! Each viewer is a field on the session's presence record; the record
//! carries a short TTL that every heartbeat refreshes, so a closed tab
//! disappears within one TTL window.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use gauntlet_protocol::now_iso;
use gauntlet_store::KeyedStore;
use gauntlet_store::Result;

use crate::keys;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub email: String,
    pub role: String,
    pub action: String,
    pub ts: String,
}

pub struct Presence {
    store: Arc<dyn KeyedStore>,
    ttl: Duration,
}

impl Presence {
    pub fn new(store: Arc<dyn KeyedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Record that a user is viewing or editing a session; refreshes
    /// the record's TTL.
    pub async fn heartbeat(
        &self,
        session_id: &str,
        email: &str,
        role: &str,
        action: &str,
    ) -> Result<()> {
        let key = keys::presence(session_id);
        let field = email.trim().to_lowercase();
        let value = json!({ "role": role, "action": action, "ts": now_iso() }).to_string();
        self.store.hset(&key, &[(field, value)]).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Users currently viewing a session.
    pub async fn viewers(&self, session_id: &str) -> Result<Vec<PresenceEntry>> {
        let raw = self.store.hgetall(&keys::presence(session_id)).await?;
        let mut out: Vec<PresenceEntry> = raw
            .into_iter()
            .map(|(email, value)| {
                serde_json::from_str::<serde_json::Value>(&value)
                    .map(|info| PresenceEntry {
                        email: email.clone(),
                        role: info["role"].as_str().unwrap_or_default().to_string(),
                        action: info["action"].as_str().unwrap_or("viewing").to_string(),
                        ts: info["ts"].as_str().unwrap_or_default().to_string(),
                    })
                    .unwrap_or(PresenceEntry {
                        email,
                        role: String::new(),
                        action: "viewing".to_string(),
                        ts: String::new(),
                    })
            })
            .collect();
        out.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(out)
    }

    pub async fn leave(&self, session_id: &str, email: &str) -> Result<()> {
        self.store
            .hdel(&keys::presence(session_id), &email.trim().to_lowercase())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_store::MemoryStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn heartbeat_then_leave() {
        let presence = Presence::new(Arc::new(MemoryStore::new()), Duration::from_secs(30));
        presence
            .heartbeat("s1", "T1@Example.com", "trainer", "editing")
            .await
            .unwrap();
        presence
            .heartbeat("s1", "rev@example.com", "reviewer", "viewing")
            .await
            .unwrap();

        let viewers = presence.viewers("s1").await.unwrap();
        assert_eq!(viewers.len(), 2);
        assert_eq!(viewers[0].email, "rev@example.com");
        assert_eq!(viewers[1].email, "t1@example.com");
        assert_eq!(viewers[1].action, "editing");

        presence.leave("s1", "t1@example.com").await.unwrap();
        assert_eq!(presence.viewers("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn presence_expires_without_heartbeat() {
        let presence = Presence::new(Arc::new(MemoryStore::new()), Duration::from_millis(20));
        presence
            .heartbeat("s1", "t1@example.com", "trainer", "viewing")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(presence.viewers("s1").await.unwrap().is_empty());
    }
}
