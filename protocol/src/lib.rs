//! Shared types for the Gauntlet review pipeline.
//!
//! Everything that crosses a crate boundary lives here: the review
//! lifecycle enums, the session record family, the task snapshot fed to
//! the rule engine, rule issues/results, and the tagged event unions
//! used by the streaming channels (council runs, review runs, and the
//! per-session event log).

mod audit;
mod events;
mod notification;
mod review;
mod session;
mod snapshot;
mod status;

pub use audit::AuditEntry;
pub use events::CouncilEvent;
pub use events::CouncilVote;
pub use events::ReviewRunEvent;
pub use events::SessionEvent;
pub use notification::Notification;
pub use notification::NotificationKind;
pub use review::IssueSeverity;
pub use review::ReviewIssue;
pub use review::ReviewResult;
pub use session::ChatMessage;
pub use session::HuntResult;
pub use session::ReviewEntry;
pub use session::ReviewerFeedback;
pub use session::SectionFeedback;
pub use session::SessionConfig;
pub use session::SessionMeta;
pub use session::SessionNotebook;
pub use session::SessionState;
pub use session::SessionSummary;
pub use session::TaskRating;
pub use session::TurnRecord;
pub use snapshot::Criterion;
pub use snapshot::HumanReview;
pub use snapshot::SelectedHunt;
pub use snapshot::TaskMetadata;
pub use snapshot::TaskSnapshot;
pub use status::Checkpoint;
pub use status::ReviewStatus;
pub use status::SessionStatus;
pub use status::Verdict;

/// UTC timestamp in ISO-8601 with a trailing `Z`, the wire format used
/// for every timestamp field in this workspace.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
