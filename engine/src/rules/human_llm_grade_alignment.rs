//! Council rule: flag large disagreements between the human grades and
//! the LLM judge. Final checkpoint only.

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use gauntlet_protocol::Checkpoint;
use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::TaskSnapshot;

use crate::registry::RuleContext;
use crate::registry::RuleError;
use crate::registry::RuleHandler;
use crate::rules::clip;
use crate::rules::clip_ellipsis;
use crate::rules::council_votes_json;
use crate::rules::grades_text;
use crate::rules::vote_summary;

pub struct HumanLlmGradeAlignment;

fn applies(snapshot: &TaskSnapshot) -> bool {
    snapshot.checkpoint == Checkpoint::Final
        && snapshot.human_reviews.len() >= 4
        && snapshot.selected_hunts.len() >= 4
}

/// Council prompt: the four slots with human and LLM grading side by
/// side.
pub fn council_prompt(snapshot: &TaskSnapshot) -> String {
    let mut lines = vec![
        "You are a QA reviewer. Compare human grader results with LLM judge results for 4 model responses.".to_string(),
        String::new(),
        "TASK PROMPT:".to_string(),
        if snapshot.prompt.is_empty() {
            "(none)".to_string()
        } else {
            clip(&snapshot.prompt, 1500)
        },
        String::new(),
        "CRITERIA (from reference):".to_string(),
    ];
    for criterion in &snapshot.criteria {
        lines.push(format!(
            "  - {}: {}",
            criterion.id,
            clip(&criterion.description, 200)
        ));
    }
    lines.push(String::new());
    lines.push("For each of 4 slots, compare HUMAN grades vs LLM judge:".to_string());
    lines.push(String::new());

    for (index, hunt) in snapshot.selected_hunts.iter().take(4).enumerate() {
        let human = snapshot.human_review_for(hunt.hunt_id);
        lines.push(format!("--- Slot {} (hunt_id={}) ---", index + 1, hunt.hunt_id));
        lines.push(format!(
            "LLM Judge: score={}, criteria={}",
            hunt.judge_score
                .map_or_else(|| "(none)".to_string(), |s| s.to_string()),
            grades_text(&hunt.judge_criteria)
        ));
        lines.push(format!(
            "LLM explanation: {}",
            if hunt.judge_explanation.is_empty() {
                "(none)".to_string()
            } else {
                clip_ellipsis(&hunt.judge_explanation, 300)
            }
        ));
        match human {
            Some(review) => {
                lines.push(format!("Human grades: {}", grades_text(&review.grades)));
                lines.push(format!(
                    "Human explanation: {}",
                    if review.explanation.is_empty() {
                        "(none)".to_string()
                    } else {
                        clip_ellipsis(&review.explanation, 300)
                    }
                ));
            }
            None => lines.push("Human: (no review)".to_string()),
        }
        lines.push(String::new());
    }

    lines.extend([
        "Is there a LARGE disagreement between human and LLM grading?".to_string(),
        "- PASS if human and LLM are broadly aligned, or differences are minor.".to_string(),
        "- FAIL if there is a major disagreement (e.g. human says fail, LLM says pass, or vice versa for key criteria).".to_string(),
        String::new(),
        "First briefly explain your reasoning, then conclude with exactly one word on a new line: PASS or FAIL.".to_string(),
        "Your final line must be only PASS or FAIL—no other format.".to_string(),
    ]);
    lines.join("\n")
}

/// Per-slot comparison payload for the evaluation UI, including the
/// specific criterion-level disagreements.
fn slot_comparisons(snapshot: &TaskSnapshot) -> Value {
    let mut slots = Vec::new();
    for (index, hunt) in snapshot.selected_hunts.iter().take(4).enumerate() {
        let human = snapshot.human_review_for(hunt.hunt_id);
        let human_grades = human.map(|r| r.grades.clone()).unwrap_or_default();
        let mut disagreements = Vec::new();
        let mut criteria_ids: Vec<&String> = hunt.judge_criteria.keys().collect();
        for id in human_grades.keys() {
            if !criteria_ids.contains(&id) {
                criteria_ids.push(id);
            }
        }
        for id in criteria_ids {
            let human_value = human_grades.get(id).map(|v| v.to_lowercase());
            let llm_value = hunt.judge_criteria.get(id).map(|v| v.to_lowercase());
            if let (Some(human_value), Some(llm_value)) = (human_value, llm_value)
                && human_value != llm_value
            {
                disagreements.push(json!({
                    "criterion": id,
                    "human": human_value,
                    "llm": llm_value,
                }));
            }
        }
        slots.push(json!({
            "slot": index + 1,
            "hunt_id": hunt.hunt_id,
            "model": hunt.model,
            "response_preview": clip(&hunt.response, 300),
            "human_grades": human_grades,
            "human_explanation": human.map(|r| clip(&r.explanation, 500)).unwrap_or_default(),
            "llm_judge_score": hunt.judge_score,
            "llm_judge_criteria": hunt.judge_criteria,
            "llm_judge_explanation": clip(&hunt.judge_explanation, 500),
            "disagreements": disagreements,
        }));
    }
    Value::Array(slots)
}

#[async_trait]
impl RuleHandler for HumanLlmGradeAlignment {
    fn id(&self) -> &'static str {
        "human_llm_grade_alignment"
    }

    async fn evaluate(
        &self,
        snapshot: &TaskSnapshot,
        _params: &Value,
        ctx: &RuleContext,
    ) -> Result<Option<ReviewIssue>, RuleError> {
        if !applies(snapshot) {
            return Ok(None);
        }
        let prompt = council_prompt(snapshot);
        let outcome = ctx.run_council(&prompt, self.id()).await;
        if outcome.passed {
            return Ok(None);
        }
        Ok(Some(
            ReviewIssue::new(
                self.id(),
                format!(
                    "Council detected a significant disagreement between human and LLM grading. Votes: {}",
                    vote_summary(&outcome.votes)
                ),
            )
            .with_hint(
                "Review your grades and explanations. Ensure they align with the LLM judge criteria, or provide a clear justification for the difference.",
            )
            .with_details(json!({
                "council_votes": council_votes_json(&outcome.votes),
                "slots": slot_comparisons(snapshot),
                "prompt": clip(&snapshot.prompt, 1000),
                "criteria": snapshot.criteria.iter().map(|c| json!({
                    "id": c.id,
                    "description": clip(&c.description, 200),
                })).collect::<Vec<_>>(),
            })),
        ))
    }
}
