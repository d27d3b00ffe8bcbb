//! Keyed store adapter for the Gauntlet review pipeline.
//!
//! All shared state lives behind the [`KeyedStore`] trait: scalar
//! values with TTL, hash records with atomic field operations (plus the
//! compare-and-set primitive the review state machine serialises on),
//! capped lists, prefix enumeration, pipelined writes, a single-key
//! transaction for in-place list edits, and append-only event streams
//! with monotonic ids and blocking reads.
//!
//! The shipped backend is the embedded [`MemoryStore`]; a networked
//! backend implements the same trait with identical semantics. Errors
//! split into transient (retriable via [`retry::with_backoff`]) and
//! permanent kinds.

mod error;
mod id;
mod memory;
mod ops;
pub mod retry;

pub use error::Result;
pub use error::Retryable;
pub use error::StoreError;
pub use id::EventId;
pub use memory::MemoryStore;
pub use ops::CasOutcome;
pub use ops::KeyedStore;
pub use ops::ListEdit;
pub use ops::PipelineOp;
pub use ops::StreamEntry;
