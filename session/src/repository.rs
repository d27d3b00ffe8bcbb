//! Per-field reads and writes of the session record.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use gauntlet_config::TaskIdentityConfig;
use gauntlet_protocol::ChatMessage;
use gauntlet_protocol::HuntResult;
use gauntlet_protocol::ReviewEntry;
use gauntlet_protocol::ReviewStatus;
use gauntlet_protocol::ReviewerFeedback;
use gauntlet_protocol::SessionConfig;
use gauntlet_protocol::SessionMeta;
use gauntlet_protocol::SessionNotebook;
use gauntlet_protocol::SessionState;
use gauntlet_protocol::SessionStatus;
use gauntlet_protocol::SessionSummary;
use gauntlet_protocol::TurnRecord;
use gauntlet_protocol::now_iso;
use gauntlet_store::CasOutcome;
use gauntlet_store::KeyedStore;
use gauntlet_store::PipelineOp;
use gauntlet_store::Result;
use gauntlet_store::StoreError;

use crate::keys;

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| StoreError::corrupt(key, e.to_string()))
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::corrupt(key, e.to_string()))
}

/// Granular access to one session's key family. Every write refreshes
/// the family's TTL so an active session never expires mid-review.
pub struct SessionRepository {
    store: Arc<dyn KeyedStore>,
    ttl: Duration,
    task_identity: TaskIdentityConfig,
}

impl SessionRepository {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        ttl: Duration,
        task_identity: TaskIdentityConfig,
    ) -> Self {
        Self {
            store,
            ttl,
            task_identity,
        }
    }

    pub fn store(&self) -> Arc<dyn KeyedStore> {
        Arc::clone(&self.store)
    }

    pub fn session_ttl(&self) -> Duration {
        self.ttl
    }

    /// Initialise a session's key family. `review_status` starts at
    /// `draft`, counters at zero.
    pub async fn create(
        &self,
        session_id: &str,
        notebook: &SessionNotebook,
        config: &SessionConfig,
        trainer_email: Option<&str>,
    ) -> Result<()> {
        let mut meta_fields = vec![
            ("version".to_string(), "0".to_string()),
            ("total_hunts".to_string(), config.parallel_workers.to_string()),
            ("completed_hunts".to_string(), "0".to_string()),
            ("breaks_found".to_string(), "0".to_string()),
            ("review_status".to_string(), ReviewStatus::Draft.to_string()),
            ("review_round".to_string(), "0".to_string()),
            ("current_turn".to_string(), "1".to_string()),
            ("qc_done".to_string(), "0".to_string()),
        ];
        if let Some(email) = trainer_email {
            meta_fields.push(("trainer_email".to_string(), email.trim().to_lowercase()));
        }
        self.store
            .pipeline(vec![
                PipelineOp::Set {
                    key: keys::sess(session_id, "config"),
                    value: encode("config", config)?,
                    ttl: Some(self.ttl),
                },
                PipelineOp::Set {
                    key: keys::sess(session_id, "notebook"),
                    value: encode("notebook", notebook)?,
                    ttl: Some(self.ttl),
                },
                PipelineOp::Set {
                    key: keys::sess(session_id, "status"),
                    value: SessionStatus::Pending.to_string(),
                    ttl: Some(self.ttl),
                },
                PipelineOp::HSet {
                    key: keys::meta(session_id),
                    fields: meta_fields,
                },
                PipelineOp::Expire {
                    key: keys::meta(session_id),
                    ttl: self.ttl,
                },
            ])
            .await
    }

    pub async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(!self.store.hgetall(&keys::meta(session_id)).await?.is_empty())
    }

    /// Refresh the TTL across the whole key family.
    pub async fn touch(&self, session_id: &str) -> Result<()> {
        let mut ops: Vec<PipelineOp> = keys::SESSION_FIELDS
            .iter()
            .map(|field| PipelineOp::Expire {
                key: keys::sess(session_id, field),
                ttl: self.ttl,
            })
            .collect();
        ops.push(PipelineOp::Expire {
            key: keys::versions(session_id),
            ttl: self.ttl,
        });
        ops.push(PipelineOp::Expire {
            key: keys::events(session_id),
            ttl: self.ttl,
        });
        ops.push(PipelineOp::Expire {
            key: keys::audit(session_id),
            ttl: self.ttl,
        });
        self.store.pipeline(ops).await
    }

    async fn get_json<T: DeserializeOwned>(&self, session_id: &str, field: &str) -> Result<Option<T>> {
        let key = keys::sess(session_id, field);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => Ok(Some(decode(&key, &raw)?)),
        }
    }

    async fn set_json<T: Serialize>(&self, session_id: &str, field: &str, value: &T) -> Result<()> {
        let key = keys::sess(session_id, field);
        self.store
            .set(&key, &encode(&key, value)?, Some(self.ttl))
            .await
    }

    pub async fn get_config(&self, session_id: &str) -> Result<Option<SessionConfig>> {
        self.get_json(session_id, "config").await
    }

    pub async fn set_config(&self, session_id: &str, config: &SessionConfig) -> Result<()> {
        self.set_json(session_id, "config", config).await
    }

    pub async fn get_notebook(&self, session_id: &str) -> Result<Option<SessionNotebook>> {
        self.get_json(session_id, "notebook").await
    }

    pub async fn set_notebook(&self, session_id: &str, notebook: &SessionNotebook) -> Result<()> {
        self.set_json(session_id, "notebook", notebook).await
    }

    pub async fn get_status(&self, session_id: &str) -> Result<SessionStatus> {
        let raw = self.store.get(&keys::sess(session_id, "status")).await?;
        Ok(raw
            .and_then(|s| SessionStatus::from_str(&s).ok())
            .unwrap_or(SessionStatus::Pending))
    }

    pub async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        self.store
            .set(
                &keys::sess(session_id, "status"),
                &status.to_string(),
                Some(self.ttl),
            )
            .await
    }

    // ---- meta hash ----

    pub async fn get_meta(&self, session_id: &str) -> Result<Option<SessionMeta>> {
        let raw = self.store.hgetall(&keys::meta(session_id)).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_meta(&raw)))
    }

    pub async fn set_meta_field(&self, session_id: &str, field: &str, value: &str) -> Result<()> {
        self.store
            .hset(
                &keys::meta(session_id),
                &[(field.to_string(), value.to_string())],
            )
            .await?;
        self.store.expire(&keys::meta(session_id), self.ttl).await?;
        Ok(())
    }

    pub async fn get_meta_field(&self, session_id: &str, field: &str) -> Result<Option<String>> {
        self.store.hget(&keys::meta(session_id), field).await
    }

    pub async fn incr_meta_field(&self, session_id: &str, field: &str, delta: i64) -> Result<i64> {
        self.store.hincrby(&keys::meta(session_id), field, delta).await
    }

    pub async fn get_review_status(&self, session_id: &str) -> Result<ReviewStatus> {
        let raw = self.get_meta_field(session_id, "review_status").await?;
        Ok(raw
            .and_then(|s| ReviewStatus::from_str(&s).ok())
            .unwrap_or(ReviewStatus::Draft))
    }

    /// Compare-and-swap on `meta.review_status`. The single
    /// serialisation point for reviewer/trainer collisions.
    pub async fn cas_review_status(
        &self,
        session_id: &str,
        expected: ReviewStatus,
        new: ReviewStatus,
    ) -> Result<CasOutcome> {
        self.store
            .hcompare_and_set(
                &keys::meta(session_id),
                "review_status",
                Some(&expected.to_string()),
                &new.to_string(),
            )
            .await
    }

    pub async fn get_review_round(&self, session_id: &str) -> Result<u32> {
        Ok(self
            .get_meta_field(session_id, "review_round")
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }

    pub async fn incr_review_round(&self, session_id: &str) -> Result<u32> {
        Ok(self.incr_meta_field(session_id, "review_round", 1).await?.max(0) as u32)
    }

    pub async fn get_qc_done(&self, session_id: &str) -> Result<bool> {
        Ok(self
            .get_meta_field(session_id, "qc_done")
            .await?
            .is_some_and(|v| v == "1" || v == "true"))
    }

    pub async fn set_qc_done(&self, session_id: &str) -> Result<()> {
        self.set_meta_field(session_id, "qc_done", "1").await
    }

    pub async fn clear_qc_done(&self, session_id: &str) -> Result<()> {
        self.set_meta_field(session_id, "qc_done", "0").await
    }

    pub async fn set_resubmitted_at(&self, session_id: &str) -> Result<String> {
        let ts = now_iso();
        self.set_meta_field(session_id, "resubmitted_at", &ts).await?;
        Ok(ts)
    }

    pub async fn trainer_email(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .get_meta_field(session_id, "trainer_email")
            .await?
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty()))
    }

    // ---- sequences ----

    /// Append a hunt result to the current-turn list and the
    /// accumulated list in one batch.
    pub async fn append_result(&self, session_id: &str, result: &HuntResult) -> Result<()> {
        let raw = encode("result", result)?;
        self.store
            .pipeline(vec![
                PipelineOp::RPush {
                    key: keys::sess(session_id, "results"),
                    value: raw.clone(),
                },
                PipelineOp::RPush {
                    key: keys::sess(session_id, "all_results"),
                    value: raw,
                },
                PipelineOp::Expire {
                    key: keys::sess(session_id, "results"),
                    ttl: self.ttl,
                },
                PipelineOp::Expire {
                    key: keys::sess(session_id, "all_results"),
                    ttl: self.ttl,
                },
            ])
            .await
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let raw = self.store.lrange(key, 0, -1).await?;
        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            match decode(key, &item) {
                Ok(value) => out.push(value),
                Err(err) => warn!("skipping undecodable entry in {key}: {err}"),
            }
        }
        Ok(out)
    }

    pub async fn results(&self, session_id: &str) -> Result<Vec<HuntResult>> {
        self.read_list(&keys::sess(session_id, "results")).await
    }

    pub async fn all_results(&self, session_id: &str) -> Result<Vec<HuntResult>> {
        self.read_list(&keys::sess(session_id, "all_results")).await
    }

    /// Reset the current-turn results, keeping the accumulated list.
    pub async fn clear_results(&self, session_id: &str) -> Result<()> {
        self.store.delete(&keys::sess(session_id, "results")).await?;
        Ok(())
    }

    pub async fn append_turn(&self, session_id: &str, turn: &TurnRecord) -> Result<()> {
        let key = keys::sess(session_id, "turns");
        self.store.rpush(&key, &encode(&key, turn)?).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(())
    }

    pub async fn turns(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        self.read_list(&keys::sess(session_id, "turns")).await
    }

    pub async fn append_history(&self, session_id: &str, message: &ChatMessage) -> Result<()> {
        let key = keys::sess(session_id, "history");
        self.store.rpush(&key, &encode(&key, message)?).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(())
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.read_list(&keys::sess(session_id, "history")).await
    }

    // ---- reviews and feedback ----

    pub async fn get_reviews(&self, session_id: &str) -> Result<BTreeMap<String, ReviewEntry>> {
        Ok(self
            .get_json(session_id, "reviews")
            .await?
            .unwrap_or_default())
    }

    pub async fn set_reviews(
        &self,
        session_id: &str,
        reviews: &BTreeMap<String, ReviewEntry>,
    ) -> Result<()> {
        self.set_json(session_id, "reviews", reviews).await
    }

    /// Completed reviews, preferring canonical `row_N` slots and
    /// falling back to hunt-id keyed entries not already covered.
    pub async fn review_count(&self, session_id: &str) -> Result<usize> {
        let reviews = self.get_reviews(session_id).await?;
        let mut row_count = 0;
        let mut other_count = 0;
        let mut row_hunt_ids: Vec<u32> = Vec::new();
        for (slot, entry) in &reviews {
            if !entry.is_completed() {
                continue;
            }
            if slot.starts_with("row_") {
                row_count += 1;
                if let Some(id) = entry.hunt_id {
                    row_hunt_ids.push(id);
                }
            } else if slot
                .parse::<u32>()
                .map(|id| !row_hunt_ids.contains(&id))
                .unwrap_or(true)
            {
                other_count += 1;
            }
        }
        Ok(if row_count > 0 { row_count } else { other_count })
    }

    pub async fn get_feedback(&self, session_id: &str) -> Result<Option<ReviewerFeedback>> {
        self.get_json(session_id, "feedback").await
    }

    pub async fn set_feedback(&self, session_id: &str, feedback: &ReviewerFeedback) -> Result<()> {
        self.set_json(session_id, "feedback", feedback).await
    }

    /// Move the current feedback to the archive list and clear it;
    /// called on resubmit so prior rounds stay visible.
    pub async fn archive_and_clear_feedback(&self, session_id: &str) -> Result<()> {
        let Some(feedback) = self.get_feedback(session_id).await? else {
            return Ok(());
        };
        let archive_key = keys::sess(session_id, "feedback_archive");
        self.store
            .pipeline(vec![
                PipelineOp::RPush {
                    key: archive_key.clone(),
                    value: encode(&archive_key, &feedback)?,
                },
                PipelineOp::Expire {
                    key: archive_key,
                    ttl: self.ttl,
                },
                PipelineOp::Delete {
                    key: keys::sess(session_id, "feedback"),
                },
            ])
            .await
    }

    pub async fn feedback_archive(&self, session_id: &str) -> Result<Vec<ReviewerFeedback>> {
        self.read_list(&keys::sess(session_id, "feedback_archive"))
            .await
    }

    // ---- composite views ----

    /// Everything the UI needs to hydrate a session, or `None` when the
    /// session does not exist.
    pub async fn get_full_state(&self, session_id: &str) -> Result<Option<SessionState>> {
        let Some(meta) = self.get_meta(session_id).await? else {
            return Ok(None);
        };
        Ok(Some(SessionState {
            session_id: session_id.to_string(),
            config: self.get_config(session_id).await?.unwrap_or_default(),
            notebook: self.get_notebook(session_id).await?.unwrap_or_default(),
            status: self.get_status(session_id).await?,
            meta,
            results: self.results(session_id).await?,
            all_results: self.all_results(session_id).await?,
            turns: self.turns(session_id).await?,
            history: self.history(session_id).await?,
            reviews: self.get_reviews(session_id).await?,
            feedback: self.get_feedback(session_id).await?,
        }))
    }

    /// Human-readable task id from notebook metadata, falling back to a
    /// session-id prefix.
    pub async fn task_display_id(&self, session_id: &str) -> Result<String> {
        let fallback = session_id.chars().take(8).collect::<String>();
        let Some(notebook) = self.get_notebook(session_id).await? else {
            return Ok(fallback);
        };
        for field in self.task_identity.lookup_fields() {
            if let Some(value) = notebook.metadata.get(field) {
                let text = match value {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                if !text.is_empty() {
                    return Ok(text);
                }
            }
        }
        Ok(fallback)
    }

    async fn summary(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        let Some(meta) = self.get_meta(session_id).await? else {
            return Ok(None);
        };
        Ok(Some(SessionSummary {
            session_id: session_id.to_string(),
            review_status: meta.review_status,
            review_round: meta.review_round,
            status: self.get_status(session_id).await?,
            task_display_id: self.task_display_id(session_id).await?,
            trainer_email: meta.trainer_email,
            total_hunts: meta.total_hunts,
            completed_hunts: meta.completed_hunts,
            breaks_found: meta.breaks_found,
        }))
    }

    /// Enumerate all live sessions. O(N) over the namespace; callers
    /// scope the result by role.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut out = Vec::new();
        for key in self.store.keys("sess:").await? {
            let Some(session_id) = key
                .strip_prefix("sess:")
                .and_then(|rest| rest.strip_suffix(":meta"))
            else {
                continue;
            };
            if let Some(summary) = self.summary(session_id).await? {
                out.push(summary);
            }
        }
        Ok(out)
    }

    pub async fn list_sessions_by_review_status(
        &self,
        status: ReviewStatus,
    ) -> Result<Vec<SessionSummary>> {
        Ok(self
            .list_sessions()
            .await?
            .into_iter()
            .filter(|summary| summary.review_status == status)
            .collect())
    }
}

fn parse_meta(raw: &HashMap<String, String>) -> SessionMeta {
    let parse_u32 = |field: &str| {
        raw.get(field)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    };
    SessionMeta {
        version: raw
            .get("version")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        total_hunts: parse_u32("total_hunts"),
        completed_hunts: parse_u32("completed_hunts"),
        breaks_found: parse_u32("breaks_found"),
        review_status: raw
            .get("review_status")
            .and_then(|v| ReviewStatus::from_str(v).ok())
            .unwrap_or(ReviewStatus::Draft),
        review_round: parse_u32("review_round"),
        current_turn: raw
            .get("current_turn")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        qc_done: raw
            .get("qc_done")
            .is_some_and(|v| v == "1" || v == "true"),
        acknowledged_at: raw.get("acknowledged_at").cloned().filter(|v| !v.is_empty()),
        resubmitted_at: raw.get("resubmitted_at").cloned().filter(|v| !v.is_empty()),
        trainer_email: raw.get("trainer_email").cloned().filter(|v| !v.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn repo() -> SessionRepository {
        SessionRepository::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(14400),
            TaskIdentityConfig::default(),
        )
    }

    fn notebook(task_id: &str) -> SessionNotebook {
        serde_json::from_value(json!({
            "prompt": "Write a haiku.",
            "response_reference": "C1: three lines",
            "metadata": { "Task ID": task_id }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_initialises_draft_meta() {
        let repo = repo();
        repo.create("s1", &notebook("T-1"), &SessionConfig::default(), Some("T1@Example.com"))
            .await
            .unwrap();
        let meta = repo.get_meta("s1").await.unwrap().unwrap();
        assert_eq!(meta.review_status, ReviewStatus::Draft);
        assert_eq!(meta.review_round, 0);
        assert_eq!(meta.version, 0);
        assert!(!meta.qc_done);
        assert_eq!(meta.trainer_email.as_deref(), Some("t1@example.com"));
        assert!(repo.exists("s1").await.unwrap());
        assert!(!repo.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn cas_review_status_conflicts_report_current() {
        let repo = repo();
        repo.create("s1", &notebook("T-1"), &SessionConfig::default(), None)
            .await
            .unwrap();
        let won = repo
            .cas_review_status("s1", ReviewStatus::Draft, ReviewStatus::Submitted)
            .await
            .unwrap();
        assert!(won.swapped());
        let lost = repo
            .cas_review_status("s1", ReviewStatus::Draft, ReviewStatus::Submitted)
            .await
            .unwrap();
        assert_eq!(
            lost,
            CasOutcome::Conflict {
                current: Some("submitted".to_string())
            }
        );
        assert_eq!(
            repo.get_review_status("s1").await.unwrap(),
            ReviewStatus::Submitted
        );
    }

    #[tokio::test]
    async fn review_count_prefers_row_slots() {
        let repo = repo();
        repo.create("s1", &notebook("T-1"), &SessionConfig::default(), None)
            .await
            .unwrap();
        let reviews: BTreeMap<String, ReviewEntry> = serde_json::from_value(json!({
            "row_1": { "hunt_id": 7, "judgment": "pass", "submitted": true },
            "row_2": { "hunt_id": 8, "grading_basis": "criteria", "submitted": true },
            "7": { "judgment": "pass" },
            "9": { "judgment": "fail" }
        }))
        .unwrap();
        repo.set_reviews("s1", &reviews).await.unwrap();
        assert_eq!(repo.review_count("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn feedback_archive_round_trip() {
        let repo = repo();
        repo.create("s1", &notebook("T-1"), &SessionConfig::default(), None)
            .await
            .unwrap();
        let feedback: ReviewerFeedback = serde_json::from_value(json!({
            "overall_comment": "Slot 2 grade is wrong.",
            "revision_flags": ["slot_2_grade"]
        }))
        .unwrap();
        repo.set_feedback("s1", &feedback).await.unwrap();
        repo.archive_and_clear_feedback("s1").await.unwrap();

        assert_eq!(repo.get_feedback("s1").await.unwrap(), None);
        let archive = repo.feedback_archive("s1").await.unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].overall_comment, "Slot 2 grade is wrong.");

        // Archiving with no current feedback is a no-op.
        repo.archive_and_clear_feedback("s1").await.unwrap();
        assert_eq!(repo.feedback_archive("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listings_scope_by_review_status() {
        let repo = repo();
        for (id, task) in [("s1", "T-1"), ("s2", "T-2")] {
            repo.create(id, &notebook(task), &SessionConfig::default(), None)
                .await
                .unwrap();
        }
        repo.cas_review_status("s2", ReviewStatus::Draft, ReviewStatus::Submitted)
            .await
            .unwrap();

        let all = repo.list_sessions().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].task_display_id, "T-1");

        let submitted = repo
            .list_sessions_by_review_status(ReviewStatus::Submitted)
            .await
            .unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].session_id, "s2");
    }

    #[tokio::test]
    async fn display_id_falls_back_to_session_prefix() {
        let repo = repo();
        repo.create(
            "abcdef1234567890",
            &SessionNotebook::default(),
            &SessionConfig::default(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(
            repo.task_display_id("abcdef1234567890").await.unwrap(),
            "abcdef12"
        );
    }

    #[tokio::test]
    async fn full_state_composes_the_key_family() {
        let repo = repo();
        repo.create("s1", &notebook("T-1"), &SessionConfig::default(), None)
            .await
            .unwrap();
        repo.append_result(
            "s1",
            &serde_json::from_value(json!({ "hunt_id": 1, "model": "m", "response": "r" })).unwrap(),
        )
        .await
        .unwrap();

        let state = repo.get_full_state("s1").await.unwrap().unwrap();
        assert_eq!(state.session_id, "s1");
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.all_results.len(), 1);
        assert_eq!(state.notebook.prompt, "Write a haiku.");

        assert!(repo.get_full_state("missing").await.unwrap().is_none());
    }
}
