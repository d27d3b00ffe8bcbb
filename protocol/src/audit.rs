use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::now_iso;

/// One entry in the append-only per-session action log. Written
/// synchronously on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: String,
    pub session_id: String,
    pub action: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AuditEntry {
    pub fn new(
        session_id: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        Self {
            ts: now_iso(),
            session_id: session_id.into(),
            action: action.into(),
            actor: actor.into(),
            details,
        }
    }
}
