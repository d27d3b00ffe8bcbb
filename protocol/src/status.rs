use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;

/// Review lifecycle of a task as seen by the trainer/reviewer loop.
///
/// `Approved` and `Rejected` are terminal. `Escalated` is terminal for
/// everyone except admins, who may approve, return, or reject an
/// escalated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewStatus {
    Draft,
    Submitted,
    Returned,
    Approved,
    Rejected,
    Escalated,
}

impl ReviewStatus {
    /// True for states no reviewer action can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Rejected)
    }
}

/// Execution status of the hunt run backing a session. Written by the
/// trainer app's executor; the review pipeline only reads it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Point in the trainer workflow at which the rule engine runs.
///
/// `Preflight` runs before submit over a caller-supplied selection;
/// `Final` runs just before a reviewer sees the task and derives the
/// selection from the submitted human reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Checkpoint {
    Preflight,
    Final,
}

/// A single judge's vote on a subjective rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Unclear,
}

impl Verdict {
    /// The label used in prompts and human-readable vote summaries.
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Unclear => "unclear",
        }
    }
}
