//! Pure projection of a session record into a [`TaskSnapshot`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use gauntlet_protocol::Checkpoint;
use gauntlet_protocol::Criterion;
use gauntlet_protocol::HumanReview;
use gauntlet_protocol::HuntResult;
use gauntlet_protocol::ReviewEntry;
use gauntlet_protocol::SelectedHunt;
use gauntlet_protocol::SessionState;
use gauntlet_protocol::TaskMetadata;
use gauntlet_protocol::TaskSnapshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Preflight requires selected_hunt_ids (list of 4 hunt IDs)")]
    PreflightSelection,
    #[error("Final checkpoint expects 4 human reviews, got {0}")]
    FinalReviewCount(usize),
}

fn criteria_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^(C\d+)\s*[:：]\s*(.+)$").unwrap_or_else(|_| unreachable!())
    })
}

fn json_array_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").unwrap_or_else(|_| unreachable!()))
}

/// Extract grading criteria from reference text.
///
/// Accepts either a JSON array whose elements carry an `id` and any key
/// starting with `criteria` as the description, or plain lines of the
/// form `C1: description`. Ids are normalised to upper case.
pub fn extract_criteria(reference: &str) -> Vec<Criterion> {
    if reference.trim().is_empty() {
        return Vec::new();
    }

    if let Some(found) = json_array_pattern().find(reference)
        && let Ok(Value::Array(items)) = serde_json::from_str::<Value>(found.as_str())
    {
        let mut out = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let Value::Object(map) = item else { continue };
            let id = map
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("C{}", index + 1));
            let description = map.iter().find_map(|(key, value)| {
                if key.starts_with("criteria") && key != "id" {
                    Some(value_to_string(value))
                } else {
                    None
                }
            });
            if let Some(description) = description {
                out.push(Criterion {
                    id: id.to_uppercase(),
                    description,
                });
            }
        }
        if !out.is_empty() {
            return out;
        }
    }

    criteria_line_pattern()
        .captures_iter(reference)
        .map(|caps| Criterion {
            id: caps[1].to_uppercase(),
            description: caps[2].trim().to_string(),
        })
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pull a metadata field through its accepted key aliases; first
/// non-empty value wins.
fn metadata_field(metadata: &BTreeMap<String, Value>, aliases: &[&str]) -> String {
    for alias in aliases {
        if let Some(value) = metadata.get(*alias) {
            let text = value_to_string(value).trim().to_string();
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Task identity fields from the notebook's free-form metadata.
pub fn extract_task_metadata(metadata: &BTreeMap<String, Value>) -> TaskMetadata {
    TaskMetadata {
        domain: metadata_field(metadata, &["Domain", "Domain:", "domain"]),
        use_case: metadata_field(metadata, &["Use Case", "UseCase", "Use Case:", "use_case"]),
        l1_taxonomy: metadata_field(
            metadata,
            &["L1 Taxonomy", "L1Taxonomy", "L1 Taxonomy:", "l1_taxonomy"],
        ),
        task_id: metadata_field(metadata, &["Task ID", "TaskID", "task_id"]),
        model: metadata_field(metadata, &["Model", "model"]),
        user_prompt_length: metadata_field(
            metadata,
            &["User Prompt Length", "UserPromptLength", "user_prompt_length"],
        ),
    }
}

fn to_selected(result: &HuntResult) -> SelectedHunt {
    SelectedHunt {
        hunt_id: result.hunt_id,
        model: result.model.clone(),
        response: result.response.clone(),
        judge_score: result.judge_score,
        judge_criteria: result.judge_criteria.clone(),
        judge_explanation: result.judge_explanation.clone(),
        is_breaking: result.is_breaking,
    }
}

fn to_human(hunt_id: u32, entry: &ReviewEntry) -> HumanReview {
    HumanReview {
        hunt_id,
        grades: entry.grades.clone(),
        explanation: entry.explanation.clone(),
        submitted: entry.submitted,
    }
}

/// Hunt id a review entry refers to: a numeric slot key, or the
/// entry's own `hunt_id` for `row_N`-style slots.
fn review_hunt_id(slot: &str, entry: &ReviewEntry) -> Option<u32> {
    slot.parse::<u32>().ok().or(entry.hunt_id)
}

/// Build a [`TaskSnapshot`] from a session record.
///
/// Preflight takes the four hunt ids the caller selected; final derives
/// them from the submitted reviews, which must number exactly four. The
/// prompt and reference come from the current turn when the notebook
/// carries per-turn copies.
pub fn build_snapshot(
    state: &SessionState,
    checkpoint: Checkpoint,
    selected_hunt_ids: Option<&[u32]>,
) -> Result<TaskSnapshot, SnapshotError> {
    let notebook = &state.notebook;
    let mut prompt = notebook.prompt.clone();
    let mut reference = notebook.response_reference.clone();

    let current_turn = state.meta.current_turn.max(1);
    if let Some(turn) = notebook.turns.get((current_turn - 1) as usize) {
        if !turn.prompt.is_empty() {
            prompt = turn.prompt.clone();
        }
        if !turn.response_reference.is_empty() {
            reference = turn.response_reference.clone();
        }
    }

    let criteria = extract_criteria(&reference);

    let ids_to_use: Vec<u32> = match checkpoint {
        Checkpoint::Preflight => {
            let ids = selected_hunt_ids.ok_or(SnapshotError::PreflightSelection)?;
            if ids.len() != 4 {
                return Err(SnapshotError::PreflightSelection);
            }
            ids.to_vec()
        }
        Checkpoint::Final => {
            let mut ids: Vec<u32> = Vec::new();
            for (slot, entry) in &state.reviews {
                if let Some(id) = review_hunt_id(slot, entry)
                    && !ids.contains(&id)
                {
                    ids.push(id);
                }
            }
            if ids.len() != 4 {
                return Err(SnapshotError::FinalReviewCount(ids.len()));
            }
            ids
        }
    };

    let results = if state.all_results.is_empty() {
        &state.results
    } else {
        &state.all_results
    };
    let by_id: BTreeMap<u32, &HuntResult> = results.iter().map(|r| (r.hunt_id, r)).collect();

    let mut selected_hunts = Vec::with_capacity(ids_to_use.len());
    for id in &ids_to_use {
        match by_id.get(id) {
            Some(result) => selected_hunts.push(to_selected(result)),
            None => warn!("hunt {id} not found in session results"),
        }
    }

    let mut human_reviews = Vec::new();
    if checkpoint == Checkpoint::Final {
        for id in &ids_to_use {
            if let Some((_, entry)) = state
                .reviews
                .iter()
                .find(|(slot, entry)| review_hunt_id(slot, entry) == Some(*id))
            {
                human_reviews.push(to_human(*id, entry));
            }
        }
    }

    Ok(TaskSnapshot {
        checkpoint,
        session_id: state.session_id.clone(),
        prompt,
        reference: reference.clone(),
        criteria,
        selected_hunts,
        human_reviews,
        turn: current_turn,
        models_used: state.config.models.clone(),
        task_metadata: extract_task_metadata(&notebook.metadata),
    })
}
