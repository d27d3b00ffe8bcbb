//! Built-in rule handlers.
//!
//! Deterministic rules check the snapshot directly; council-backed
//! rules build a rule-specific prompt and defer the judgment to the
//! LLM council. Council rules that do not apply to a snapshot (wrong
//! checkpoint, missing data) pass silently.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;

use gauntlet_protocol::CouncilVote;
use gauntlet_protocol::Verdict;

use crate::registry::RuleHandler;

pub mod criteria;
pub mod diversity;
pub mod human_explanation_justifies_grade;
pub mod human_llm_grade_alignment;
pub mod metadata_prompt_alignment;
pub mod metadata_taxonomy_alignment;
pub mod model_consistency;
pub mod qc_cfa_criteria_valid;
pub mod safety_context_aware;
pub mod selection;

/// Every built-in handler, for registry construction.
pub(crate) fn default_handlers() -> Vec<Arc<dyn RuleHandler>> {
    vec![
        Arc::new(selection::SelectionCount),
        Arc::new(model_consistency::ModelConsistency),
        Arc::new(diversity::Diversity),
        Arc::new(criteria::CriteriaPresent),
        Arc::new(human_llm_grade_alignment::HumanLlmGradeAlignment),
        Arc::new(metadata_prompt_alignment::MetadataPromptAlignment),
        Arc::new(metadata_taxonomy_alignment::MetadataTaxonomyAlignment),
        Arc::new(human_explanation_justifies_grade::HumanExplanationJustifiesGrade),
        Arc::new(safety_context_aware::SafetyContextAware),
        Arc::new(qc_cfa_criteria_valid::QcCfaCriteriaValid),
    ]
}

/// First `max` characters of a string, on char boundaries.
pub(crate) fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Like [`clip`], but marks truncation with an ellipsis.
pub(crate) fn clip_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", clip(text, max))
    } else {
        text.to_string()
    }
}

/// `model: PASS, other: ?` summary for issue messages.
pub(crate) fn vote_summary(votes: &[CouncilVote]) -> String {
    votes
        .iter()
        .map(|vote| {
            let label = match vote.verdict {
                Verdict::Pass => "PASS",
                Verdict::Fail => "FAIL",
                Verdict::Unclear => "?",
            };
            format!("{}: {label}", vote.model)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Votes as a JSON array for issue details.
pub(crate) fn council_votes_json(votes: &[CouncilVote]) -> Value {
    Value::Array(
        votes
            .iter()
            .map(|vote| json!({ "model": vote.model, "vote": vote.verdict.label() }))
            .collect(),
    )
}

/// Compact `{"C1":"pass"}` rendering for prompt text.
pub(crate) fn grades_text(grades: &BTreeMap<String, String>) -> String {
    serde_json::to_string(grades).unwrap_or_default()
}
