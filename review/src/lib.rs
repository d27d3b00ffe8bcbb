//! The review state machine.
//!
//! Every transition serialises on a compare-and-swap over the session's
//! `review_status` meta field: the winner applies its side effects
//! (round counter, history snapshot, feedback archive, QC and
//! acknowledgement flags), bumps the version, writes the audit entry,
//! and fires notifications that are allowed to fail. The loser observes
//! a conflict carrying the state it lost to.

mod error;
mod pipeline;

pub use error::ReviewError;
pub use pipeline::BulkFailure;
pub use pipeline::BulkOutcome;
pub use pipeline::ReviewPipeline;
pub use pipeline::TransitionOutcome;
