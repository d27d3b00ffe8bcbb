//! Session coordination layer: the per-task record family and the
//! services that surround it.
//!
//! A session is one logical entity stored as a family of related keys
//! (`sess:{id}:config`, `:notebook`, `:status`, `:meta`, `:results`,
//! `:all_results`, `:turns`, `:history`, `:reviews`, `:feedback`,
//! `:feedback_archive`) so that writing one field never requires
//! reading the others. Alongside the repository live versioning and
//! idempotency, history snapshots with field-level diffs, viewer
//! presence, the per-session event log, per-user notifications, and the
//! append-only audit trail.

mod audit;
mod events;
mod keys;
mod notifications;
mod presence;
mod repository;
mod versioning;

pub use audit::AuditLog;
pub use events::EventLog;
pub use events::EventSubscription;
pub use events::EVENTS_MAXLEN;
pub use notifications::NotificationStore;
pub use notifications::safe_notify;
pub use presence::Presence;
pub use presence::PresenceEntry;
pub use repository::SessionRepository;
pub use versioning::DiffChange;
pub use versioning::Versioning;
pub use versioning::compute_diff;
