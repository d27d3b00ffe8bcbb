use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::status::Checkpoint;

/// One grading criterion extracted from the reference text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Upper-cased id, e.g. `C1`.
    pub id: String,
    pub description: String,
}

/// A hunt the trainer selected for review, carried into the snapshot
/// together with its LLM-judge grading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedHunt {
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

/// The human grading of one selected hunt, present only at the final
/// checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanReview {
    pub hunt_id: u32,
    /// Criterion id to `"pass"` / `"fail"`.
    #[serde(default)]
    pub grades: BTreeMap<String, String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub submitted: bool,
}

/// Task identity fields extracted from the notebook's free-form
/// metadata via the configured key aliases. Missing fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub use_case: String,
    #[serde(default)]
    pub l1_taxonomy: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub user_prompt_length: String,
}

/// Immutable projection of a session fed to the rule engine.
///
/// Preflight snapshots carry `selected_hunts` but no `human_reviews`;
/// final snapshots carry both. The builder never performs I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub checkpoint: Checkpoint,
    pub session_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub selected_hunts: Vec<SelectedHunt>,
    #[serde(default)]
    pub human_reviews: Vec<HumanReview>,
    /// 1-based turn the prompt/reference were resolved from.
    pub turn: u32,
    /// Models configured for the hunt run.
    #[serde(default)]
    pub models_used: Vec<String>,
    #[serde(default)]
    pub task_metadata: TaskMetadata,
}

impl TaskSnapshot {
    /// Review for a given hunt id, if one was submitted.
    pub fn human_review_for(&self, hunt_id: u32) -> Option<&HumanReview> {
        self.human_reviews.iter().find(|r| r.hunt_id == hunt_id)
    }

    /// Distinct models across the selected hunts, in first-seen order.
    pub fn selected_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for hunt in &self.selected_hunts {
            if !models.contains(&hunt.model) {
                models.push(hunt.model.clone());
            }
        }
        models
    }
}
