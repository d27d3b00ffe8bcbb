use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::status::ReviewStatus;
use crate::status::SessionStatus;

/// Hunt configuration written by the trainer app. Opaque to the review
/// pipeline beyond the model list and worker count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: u32,
    /// Judge settings forwarded verbatim to the executor.
    #[serde(default)]
    pub judge: Value,
}

fn default_parallel_workers() -> u32 {
    4
}

/// One turn of a multi-turn session: the prompt shown to the models and
/// the reference text the criteria are extracted from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub response_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_hunt_id: Option<u32>,
}

/// A chat message in the session's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The uploaded notebook: prompt, reference, per-turn history, and the
/// free-form metadata map task identity is extracted from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionNotebook {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub response_reference: String,
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// One model attempt at the prompt, with the LLM judge's grading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HuntResult {
    pub hunt_id: u32,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_score: Option<i32>,
    #[serde(default)]
    pub judge_criteria: BTreeMap<String, String>,
    #[serde(default)]
    pub judge_explanation: String,
    #[serde(default)]
    pub is_breaking: bool,
}

/// A trainer's review of one selected hunt. `judgment`,
/// `grading_basis`, and `explanation` are the fields covered by the
/// version-history diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunt_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgment: Option<String>,
    #[serde(default)]
    pub grading_basis: String,
    /// Per-criterion grade, `criterion id -> "pass" | "fail"`.
    #[serde(default)]
    pub grades: BTreeMap<String, String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub submitted: bool,
}

impl ReviewEntry {
    /// A review counts as completed once it carries a judgment, a
    /// grading basis, or has been explicitly submitted.
    pub fn is_completed(&self) -> bool {
        self.judgment.is_some() || !self.grading_basis.is_empty() || self.submitted
    }
}

/// Quick reviewer reaction to the whole task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRating {
    Like,
    #[default]
    Neutral,
    Dislike,
}

/// Per-section reviewer feedback (a section is a slot, a criterion, or
/// the QC pass).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionFeedback {
    pub section_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_label: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub appreciation: String,
    #[serde(default)]
    pub liked: bool,
}

/// Everything a reviewer wrote about one task. Archived wholesale on
/// resubmit so prior rounds stay visible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewerFeedback {
    #[serde(default)]
    pub overall_comment: String,
    #[serde(default)]
    pub overall_appreciation: String,
    #[serde(default)]
    pub task_rating: TaskRating,
    #[serde(default)]
    pub summary_line: String,
    #[serde(default)]
    pub section_feedback: Vec<SectionFeedback>,
    /// Comment attached on approval, separate from return comments.
    #[serde(default)]
    pub approval_comment: String,
    /// Sections the trainer must revise: `selection`, `slot_N_grade`,
    /// `slot_N_explanation`, `qc`.
    #[serde(default)]
    pub revision_flags: Vec<String>,
}

/// The authoritative per-session counters and review state, stored as a
/// hash so individual fields update atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub version: u64,
    pub total_hunts: u32,
    pub completed_hunts: u32,
    pub breaks_found: u32,
    pub review_status: ReviewStatus,
    pub review_round: u32,
    pub current_turn: u32,
    pub qc_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resubmitted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_email: Option<String>,
}

impl Default for SessionMeta {
    fn default() -> Self {
        Self {
            version: 0,
            total_hunts: 0,
            completed_hunts: 0,
            breaks_found: 0,
            review_status: ReviewStatus::Draft,
            review_round: 0,
            current_turn: 1,
            qc_done: false,
            acknowledged_at: None,
            resubmitted_at: None,
            trainer_email: None,
        }
    }
}

/// Composite view of a session, assembled from its key family for UI
/// hydration and for the snapshot builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub notebook: SessionNotebook,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub results: Vec<HuntResult>,
    #[serde(default)]
    pub all_results: Vec<HuntResult>,
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Slot id (`row_1`.. or a hunt id) to review.
    #[serde(default)]
    pub reviews: BTreeMap<String, ReviewEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<ReviewerFeedback>,
}

/// Queue-listing projection of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub review_status: ReviewStatus,
    pub review_round: u32,
    pub status: SessionStatus,
    pub task_display_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_email: Option<String>,
    pub total_hunts: u32,
    pub completed_hunts: u32,
    pub breaks_found: u32,
}
