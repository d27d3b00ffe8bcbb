use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use uuid::Uuid;

use crate::now_iso;

/// What happened to a task, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    TaskSubmitted,
    TaskResubmitted,
    TaskReturned,
    TaskApproved,
    TaskRejected,
    TaskEscalated,
}

/// In-app notification, stored newest-first in a capped per-user list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub session_id: String,
    /// Human-readable task id resolved from notebook metadata; falls
    /// back to a session-id prefix.
    #[serde(default)]
    pub task_display_id: String,
    pub message: String,
    pub created_at: String,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        session_id: impl Into<String>,
        message: impl Into<String>,
        task_display_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            session_id: session_id.into(),
            task_display_id: task_display_id.into(),
            message: message.into(),
            created_at: now_iso(),
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_serializes_as_type_field() {
        let notif = Notification::new(NotificationKind::TaskReturned, "s1", "msg", "TASK-9");
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["type"], "task_returned");
        assert_eq!(json["read"], false);
    }
}
