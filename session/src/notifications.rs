//! Per-user in-app notifications.
//!
//! A capped, TTL'd list per email, newest first. Mark-read operations
//! edit matching elements in place under the key's lock so they never
//! race concurrent pushes. Pushes triggered by state transitions go
//! through [`safe_notify`], which swallows failures: a store blip must
//! not fail the transition that caused the notification.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use gauntlet_protocol::Notification;
use gauntlet_protocol::NotificationKind;
use gauntlet_store::KeyedStore;
use gauntlet_store::PipelineOp;
use gauntlet_store::Result;
use gauntlet_store::StoreError;

use crate::keys;

/// At most this many notifications are kept per user.
const NOTIF_MAX: i64 = 100;

/// Notifications outlive sessions: seven days.
const NOTIF_TTL: Duration = Duration::from_secs(7 * 86400);

/// Await a notification future without propagating its failure.
pub async fn safe_notify<F>(op: F, context: &str)
where
    F: Future<Output = Result<()>>,
{
    if let Err(err) = op.await {
        warn!("non-critical notification failed ({context}) — swallowed: {err}");
    }
}

pub struct NotificationStore {
    store: Arc<dyn KeyedStore>,
}

impl NotificationStore {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Build and push a notification in one call. Empty recipients are
    /// skipped silently.
    pub async fn notify(
        &self,
        email: &str,
        kind: NotificationKind,
        session_id: &str,
        message: &str,
        task_display_id: &str,
    ) -> Result<()> {
        if email.trim().is_empty() {
            return Ok(());
        }
        self.push(
            email,
            &Notification::new(kind, session_id, message, task_display_id),
        )
        .await
    }

    /// Push to the head of the user's list, trim to the cap, refresh
    /// the TTL.
    pub async fn push(&self, email: &str, notification: &Notification) -> Result<()> {
        if email.trim().is_empty() {
            return Ok(());
        }
        let key = keys::notif(email);
        let payload = serde_json::to_string(notification)
            .map_err(|e| StoreError::corrupt(&key, e.to_string()))?;
        self.store
            .pipeline(vec![
                PipelineOp::LPush {
                    key: key.clone(),
                    value: payload,
                },
                PipelineOp::LTrim {
                    key: key.clone(),
                    start: 0,
                    stop: NOTIF_MAX - 1,
                },
                PipelineOp::Expire {
                    key,
                    ttl: NOTIF_TTL,
                },
            ])
            .await?;
        debug!("notification pushed to {email}: {}", notification.kind);
        Ok(())
    }

    /// Notifications for a user, newest first.
    pub async fn list(
        &self,
        email: &str,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        if email.trim().is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .store
            .lrange(&keys::notif(email), 0, limit.max(1) as i64 - 1)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|item| serde_json::from_str::<Notification>(item).ok())
            .filter(|n| !unread_only || !n.read)
            .collect())
    }

    pub async fn unread_count(&self, email: &str) -> Result<usize> {
        Ok(self.list(email, true, NOTIF_MAX as usize).await?.len())
    }

    /// Atomically mark one notification read. Returns false when no
    /// unread notification with that id exists.
    pub async fn mark_one_read(&self, email: &str, notification_id: &str) -> Result<bool> {
        if email.trim().is_empty() || notification_id.is_empty() {
            return Ok(false);
        }
        let target = notification_id.to_string();
        let changed = self
            .store
            .with_list(
                &keys::notif(email),
                Box::new(move |items| {
                    for item in items.iter_mut() {
                        let Ok(mut notification) =
                            serde_json::from_str::<Notification>(item)
                        else {
                            continue;
                        };
                        if notification.id == target && !notification.read {
                            notification.read = true;
                            if let Ok(updated) = serde_json::to_string(&notification) {
                                *item = updated;
                                return 1;
                            }
                        }
                    }
                    0
                }),
            )
            .await?;
        Ok(changed > 0)
    }

    /// Atomically mark every unread notification read; returns how many
    /// changed.
    pub async fn mark_all_read(&self, email: &str) -> Result<u64> {
        if email.trim().is_empty() {
            return Ok(0);
        }
        self.store
            .with_list(
                &keys::notif(email),
                Box::new(|items| {
                    let mut changed = 0;
                    for item in items.iter_mut() {
                        let Ok(mut notification) =
                            serde_json::from_str::<Notification>(item)
                        else {
                            continue;
                        };
                        if !notification.read {
                            notification.read = true;
                            if let Ok(updated) = serde_json::to_string(&notification) {
                                *item = updated;
                                changed += 1;
                            }
                        }
                    }
                    changed
                }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn notifications() -> NotificationStore {
        NotificationStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn push_lists_newest_first() {
        let store = notifications();
        for n in 1..=3 {
            store
                .notify(
                    "T1@Example.com",
                    NotificationKind::TaskReturned,
                    &format!("s{n}"),
                    "returned",
                    "",
                )
                .await
                .unwrap();
        }
        let list = store.list("t1@example.com", false, 50).await.unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].session_id, "s3");
        assert_eq!(store.unread_count("t1@example.com").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn list_caps_at_hundred() {
        let store = notifications();
        for n in 0..120 {
            store
                .notify(
                    "t@example.com",
                    NotificationKind::TaskSubmitted,
                    &format!("s{n}"),
                    "submitted",
                    "",
                )
                .await
                .unwrap();
        }
        let list = store.list("t@example.com", false, 200).await.unwrap();
        assert_eq!(list.len(), 100);
        assert_eq!(list[0].session_id, "s119");
    }

    #[tokio::test]
    async fn mark_one_read_is_targeted() {
        let store = notifications();
        store
            .notify("t@example.com", NotificationKind::TaskApproved, "s1", "approved", "")
            .await
            .unwrap();
        store
            .notify("t@example.com", NotificationKind::TaskReturned, "s2", "returned", "")
            .await
            .unwrap();
        let list = store.list("t@example.com", false, 50).await.unwrap();
        let target = list[1].id.clone();

        assert!(store.mark_one_read("t@example.com", &target).await.unwrap());
        // Second attempt finds nothing unread with that id.
        assert!(!store.mark_one_read("t@example.com", &target).await.unwrap());
        assert_eq!(store.unread_count("t@example.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_all_read_counts_changes() {
        let store = notifications();
        for n in 0..4 {
            store
                .notify(
                    "t@example.com",
                    NotificationKind::TaskEscalated,
                    &format!("s{n}"),
                    "escalated",
                    "",
                )
                .await
                .unwrap();
        }
        assert_eq!(store.mark_all_read("t@example.com").await.unwrap(), 4);
        assert_eq!(store.mark_all_read("t@example.com").await.unwrap(), 0);
        assert_eq!(store.unread_count("t@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_email_is_a_no_op() {
        let store = notifications();
        store
            .notify("", NotificationKind::TaskApproved, "s1", "msg", "")
            .await
            .unwrap();
        assert!(store.list("", false, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn safe_notify_swallows_failures() {
        safe_notify(
            async { Err(StoreError::Transient("down".to_string())) },
            "test push",
        )
        .await;
        // Reaching here is the assertion: no panic, no propagation.
    }
}
