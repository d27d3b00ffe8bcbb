//! Key layout for the store namespace.

/// `sess:{id}:{field}`, one key per session field.
pub(crate) fn sess(session_id: &str, field: &str) -> String {
    format!("sess:{session_id}:{field}")
}

pub(crate) fn meta(session_id: &str) -> String {
    sess(session_id, "meta")
}

pub(crate) fn versions(session_id: &str) -> String {
    format!("versions:{session_id}")
}

pub(crate) fn events(session_id: &str) -> String {
    format!("events:{session_id}")
}

pub(crate) fn audit(session_id: &str) -> String {
    format!("audit:{session_id}")
}

pub(crate) fn presence(session_id: &str) -> String {
    format!("presence:{session_id}")
}

pub(crate) fn notif(email: &str) -> String {
    format!("notif:{}", email.trim().to_lowercase())
}

pub(crate) fn idemp(key: &str) -> String {
    format!("idemp:{key}")
}

/// Fields that make up a session's key family, for TTL refresh and
/// deletion.
pub(crate) const SESSION_FIELDS: [&str; 11] = [
    "config",
    "notebook",
    "status",
    "meta",
    "results",
    "all_results",
    "turns",
    "history",
    "reviews",
    "feedback",
    "feedback_archive",
];
