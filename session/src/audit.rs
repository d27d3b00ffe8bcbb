//! Append-only per-session action log, written synchronously on state
//! transitions.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use gauntlet_protocol::AuditEntry;
use gauntlet_store::KeyedStore;
use gauntlet_store::Result;
use gauntlet_store::StoreError;

use crate::keys;

pub struct AuditLog {
    store: Arc<dyn KeyedStore>,
    ttl: Duration,
}

impl AuditLog {
    pub fn new(store: Arc<dyn KeyedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn append(
        &self,
        session_id: &str,
        action: &str,
        actor: &str,
        details: Option<Value>,
    ) -> Result<()> {
        let entry = AuditEntry::new(session_id, action, actor, details);
        let key = keys::audit(session_id);
        let payload =
            serde_json::to_string(&entry).map_err(|e| StoreError::corrupt(&key, e.to_string()))?;
        self.store.rpush(&key, &payload).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Recent entries, newest first.
    pub async fn entries(&self, session_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        let raw = self
            .store
            .lrange(&keys::audit(session_id), -(limit.max(1) as i64), -1)
            .await?;
        let mut out: Vec<AuditEntry> = raw
            .iter()
            .filter_map(|item| serde_json::from_str(item).ok())
            .collect();
        out.reverse();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn entries_come_back_newest_first() {
        let audit = AuditLog::new(Arc::new(MemoryStore::new()), Duration::from_secs(14400));
        audit.append("s1", "submitted", "trainer", None).await.unwrap();
        audit
            .append("s1", "returned", "rev@example.com", Some(json!({"round": 1})))
            .await
            .unwrap();

        let entries = audit.entries("s1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "returned");
        assert_eq!(entries[1].action, "submitted");
        assert_eq!(entries[0].details.as_ref().unwrap()["round"], 1);
    }

    #[tokio::test]
    async fn limit_returns_most_recent() {
        let audit = AuditLog::new(Arc::new(MemoryStore::new()), Duration::from_secs(14400));
        for n in 0..5 {
            audit
                .append("s1", &format!("action_{n}"), "actor", None)
                .await
                .unwrap();
        }
        let entries = audit.entries("s1", 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "action_4");
    }
}
