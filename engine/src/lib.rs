//! Rule engine and snapshot builder for the agentic quality gate.
//!
//! [`build_snapshot`] projects a session record into an immutable
//! [`TaskSnapshot`](gauntlet_protocol::TaskSnapshot) without touching
//! the store. [`RuleEngine`] filters the configured rule set by
//! checkpoint and dispatches each rule to its registered handler;
//! deterministic rules inspect the snapshot directly, council-backed
//! rules build a rule-specific prompt and put it to the LLM council.
//! The streaming run narrates every rule (what it is checking, each
//! judge's live tokens, and the pass/fail rationale) over a typed
//! event channel.

mod engine;
mod registry;
mod rules;
mod snapshot;
mod stream_payload;

pub use engine::RuleEngine;
pub use registry::RuleContext;
pub use registry::RuleError;
pub use registry::RuleHandler;
pub use registry::RuleRegistry;
pub use snapshot::SnapshotError;
pub use snapshot::build_snapshot;
pub use snapshot::extract_criteria;
pub use snapshot::extract_task_metadata;
pub use stream_payload::build_content_checked;
pub use stream_payload::build_rationale;
