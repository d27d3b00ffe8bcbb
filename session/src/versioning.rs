//! Optimistic-concurrency versioning, idempotency keys, review history
//! snapshots, and the field-level diff between snapshots.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use gauntlet_protocol::now_iso;
use gauntlet_store::KeyedStore;
use gauntlet_store::PipelineOp;
use gauntlet_store::Result;

use crate::keys;

/// History keeps at most this many snapshots per session.
const MAX_VERSIONS: i64 = 20;

/// The review fields covered by [`compute_diff`].
const DIFF_FIELDS: [&str; 3] = ["judgment", "grading_basis", "explanation"];

/// One changed field between two review snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffChange {
    pub slot: String,
    pub field: String,
    pub old: Value,
    pub new: Value,
}

pub struct Versioning {
    store: Arc<dyn KeyedStore>,
    session_ttl: Duration,
    idempotency_ttl: Duration,
}

impl Versioning {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        session_ttl: Duration,
        idempotency_ttl: Duration,
    ) -> Self {
        Self {
            store,
            session_ttl,
            idempotency_ttl,
        }
    }

    // ---- version counter (optimistic locking) ----

    /// Atomically increment and return the session version. Starts at 1.
    pub async fn incr_version(&self, session_id: &str) -> Result<u64> {
        let next = self
            .store
            .hincrby(&keys::meta(session_id), "version", 1)
            .await?;
        Ok(next.max(0) as u64)
    }

    pub async fn get_version(&self, session_id: &str) -> Result<u64> {
        Ok(self
            .store
            .hget(&keys::meta(session_id), "version")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    /// Compare a client's last-seen version with the current one.
    /// Expected 0 means "no expectation" and always matches.
    pub async fn check_version_match(&self, session_id: &str, expected: u64) -> Result<(bool, u64)> {
        let current = self.get_version(session_id).await?;
        Ok((expected == 0 || current == expected, current))
    }

    // ---- idempotency ----

    /// Cached response for a client-supplied idempotency key, if any.
    pub async fn check_idempotency(&self, key: &str) -> Result<Option<Value>> {
        if key.is_empty() {
            return Ok(None);
        }
        match self.store.get(&keys::idemp(key)).await? {
            None => Ok(None),
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
        }
    }

    pub async fn store_idempotency(&self, key: &str, response: &Value) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.store
            .set(
                &keys::idemp(key),
                &response.to_string(),
                Some(self.idempotency_ttl),
            )
            .await
    }

    // ---- history snapshots ----

    /// Capture the current reviews as a snapshot tagged with the round.
    pub async fn snapshot_for_history(&self, session_id: &str, round: u32) -> Result<()> {
        let reviews: Value = match self.store.get(&keys::sess(session_id, "reviews")).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| json!({})),
            None => json!({}),
        };
        let snapshot = json!({
            "round": round,
            "timestamp": now_iso(),
            "reviews": reviews,
        });
        let key = keys::versions(session_id);
        self.store
            .pipeline(vec![
                PipelineOp::RPush {
                    key: key.clone(),
                    value: snapshot.to_string(),
                },
                PipelineOp::LTrim {
                    key: key.clone(),
                    start: -MAX_VERSIONS,
                    stop: -1,
                },
                PipelineOp::Expire {
                    key,
                    ttl: self.session_ttl,
                },
            ])
            .await
    }

    /// All snapshots, oldest first, each tagged with its 1-based
    /// version number.
    pub async fn version_history(&self, session_id: &str) -> Result<Vec<Value>> {
        let raw = self.store.lrange(&keys::versions(session_id), 0, -1).await?;
        let mut out = Vec::with_capacity(raw.len());
        for (index, item) in raw.iter().enumerate() {
            if let Ok(mut value) = serde_json::from_str::<Value>(item) {
                if let Some(object) = value.as_object_mut() {
                    object.insert("version".to_string(), json!(index + 1));
                }
                out.push(value);
            }
        }
        Ok(out)
    }

    // ---- acknowledgement ----

    /// Record that the trainer acknowledged reviewer feedback. Returns
    /// the timestamp written.
    pub async fn set_acknowledged(&self, session_id: &str) -> Result<String> {
        let ts = now_iso();
        self.store
            .hset(
                &keys::meta(session_id),
                &[("acknowledged_at".to_string(), ts.clone())],
            )
            .await?;
        Ok(ts)
    }

    pub async fn acknowledged_at(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .hget(&keys::meta(session_id), "acknowledged_at")
            .await?
            .filter(|v| !v.is_empty()))
    }

    pub async fn clear_acknowledged(&self, session_id: &str) -> Result<()> {
        self.store
            .hdel(&keys::meta(session_id), "acknowledged_at")
            .await?;
        Ok(())
    }
}

/// Field-level diff between two review snapshots. Pure over the two
/// JSON objects; covers `judgment`, `grading_basis`, `explanation`,
/// plus slot insertions and removals.
pub fn compute_diff(v1: &Value, v2: &Value) -> Vec<DiffChange> {
    let empty = serde_json::Map::new();
    let old_map = v1.as_object().unwrap_or(&empty);
    let new_map = v2.as_object().unwrap_or(&empty);

    let mut slots: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
    slots.sort();
    slots.dedup();

    let mut changes = Vec::new();
    for slot in slots {
        match (old_map.get(slot), new_map.get(slot)) {
            (None, Some(_)) => {
                changes.push(DiffChange {
                    slot: slot.clone(),
                    field: "added".to_string(),
                    old: Value::Null,
                    new: json!("new review"),
                });
            }
            (Some(_), None) => {
                changes.push(DiffChange {
                    slot: slot.clone(),
                    field: "removed".to_string(),
                    old: json!("had review"),
                    new: Value::Null,
                });
            }
            (Some(old), Some(new)) => {
                for field in DIFF_FIELDS {
                    let old_value = old.get(field).cloned().unwrap_or(Value::Null);
                    let new_value = new.get(field).cloned().unwrap_or(Value::Null);
                    if old_value != new_value {
                        changes.push(DiffChange {
                            slot: slot.clone(),
                            field: field.to_string(),
                            old: old_value,
                            new: new_value,
                        });
                    }
                }
            }
            (None, None) => {}
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn versioning() -> Versioning {
        Versioning::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(14400),
            Duration::from_secs(86400),
        )
    }

    #[tokio::test]
    async fn version_counter_starts_at_one() {
        let versioning = versioning();
        assert_eq!(versioning.get_version("s1").await.unwrap(), 0);
        assert_eq!(versioning.incr_version("s1").await.unwrap(), 1);
        assert_eq!(versioning.incr_version("s1").await.unwrap(), 2);

        let (ok, current) = versioning.check_version_match("s1", 2).await.unwrap();
        assert!(ok);
        assert_eq!(current, 2);
        let (ok, _) = versioning.check_version_match("s1", 1).await.unwrap();
        assert!(!ok);
        // Zero means no expectation.
        let (ok, _) = versioning.check_version_match("s1", 0).await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn idempotency_round_trip() {
        let versioning = versioning();
        assert_eq!(versioning.check_idempotency("key-1").await.unwrap(), None);
        let response = json!({ "ok": true, "review_status": "submitted" });
        versioning
            .store_idempotency("key-1", &response)
            .await
            .unwrap();
        assert_eq!(
            versioning.check_idempotency("key-1").await.unwrap(),
            Some(response)
        );
        // Empty keys are ignored.
        assert_eq!(versioning.check_idempotency("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_caps_at_twenty_snapshots() {
        let versioning = versioning();
        for round in 1..=25u32 {
            versioning.snapshot_for_history("s1", round).await.unwrap();
        }
        let history = versioning.version_history("s1").await.unwrap();
        assert_eq!(history.len(), 20);
        // Oldest snapshots were trimmed away.
        assert_eq!(history[0]["round"], 6);
        assert_eq!(history[0]["version"], 1);
        assert_eq!(history[19]["round"], 25);
    }

    #[tokio::test]
    async fn acknowledgement_lifecycle() {
        let versioning = versioning();
        assert_eq!(versioning.acknowledged_at("s1").await.unwrap(), None);
        let ts = versioning.set_acknowledged("s1").await.unwrap();
        assert_eq!(versioning.acknowledged_at("s1").await.unwrap(), Some(ts));
        versioning.clear_acknowledged("s1").await.unwrap();
        assert_eq!(versioning.acknowledged_at("s1").await.unwrap(), None);
    }

    #[test]
    fn diff_of_identical_maps_is_empty() {
        let reviews = json!({ "1": { "judgment": "pass", "explanation": "ok" } });
        assert!(compute_diff(&reviews, &reviews).is_empty());
    }

    #[test]
    fn diff_covers_fields_additions_and_removals() {
        let v1 = json!({
            "1": { "judgment": "pass", "grading_basis": "criteria", "explanation": "ok" },
            "2": { "judgment": "fail" }
        });
        let v2 = json!({
            "1": { "judgment": "fail", "grading_basis": "criteria", "explanation": "worse" },
            "3": { "judgment": "pass" }
        });
        let changes = compute_diff(&v1, &v2);
        assert_eq!(
            changes,
            vec![
                DiffChange {
                    slot: "1".to_string(),
                    field: "judgment".to_string(),
                    old: json!("pass"),
                    new: json!("fail"),
                },
                DiffChange {
                    slot: "1".to_string(),
                    field: "explanation".to_string(),
                    old: json!("ok"),
                    new: json!("worse"),
                },
                DiffChange {
                    slot: "2".to_string(),
                    field: "removed".to_string(),
                    old: json!("had review"),
                    new: Value::Null,
                },
                DiffChange {
                    slot: "3".to_string(),
                    field: "added".to_string(),
                    old: Value::Null,
                    new: json!("new review"),
                },
            ]
        );
    }

    #[test]
    fn diff_applied_to_old_yields_new_for_covered_fields() {
        let v1 = json!({ "1": { "judgment": "pass", "explanation": "ok" } });
        let v2 = json!({ "1": { "judgment": "fail", "explanation": "ok" } });
        let mut patched = v1.clone();
        for change in compute_diff(&v1, &v2) {
            patched[&change.slot][&change.field] = change.new;
        }
        assert_eq!(patched, v2);
    }
}
