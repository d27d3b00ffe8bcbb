//! Council rule: human explanations must be substantive enough to
//! justify the grades they accompany.

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
use crate::rules::council_votes_json;
use crate::rules::grades_text;
use crate::rules::vote_summary;

pub struct HumanExplanationJustifiesGrade;

fn applies(snapshot: &TaskSnapshot) -> bool {
    snapshot.checkpoint == Checkpoint::Final
        && snapshot.human_reviews.len() >= 4
        && snapshot.selected_hunts.len() >= 4
}

pub fn council_prompt(snapshot: &TaskSnapshot) -> String {
    let mut lines = vec![
        "You are a QA reviewer. Check if the human grader explanations are substantive and justify the grades given.".to_string(),
        String::new(),
        "TASK PROMPT:".to_string(),
        clip(&snapshot.prompt, 1000),
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
    lines.push("For each of 4 slots, the human gave grades and an explanation:".to_string());
    lines.push(String::new());

    for (index, hunt) in snapshot.selected_hunts.iter().take(4).enumerate() {
        let human = snapshot.human_review_for(hunt.hunt_id);
        lines.push(format!("--- Slot {} (hunt_id={}) ---", index + 1, hunt.hunt_id));
        lines.push(format!("Response preview: {}...", clip(&hunt.response, 200)));
        match human {
            Some(review) => {
                lines.push(format!("Human grades: {}", grades_text(&review.grades)));
                lines.push(format!(
                    "Human explanation: {}",
                    if review.explanation.is_empty() {
                        "(empty)".to_string()
                    } else {
                        review.explanation.clone()
                    }
                ));
            }
            None => lines.push("Human: (no review)".to_string()),
        }
        lines.push(String::new());
    }

    lines.extend([
        "Are the human explanations substantive?".to_string(),
        "- PASS if explanations give concrete reasons that justify the grades (e.g. cite criteria, point to specific issues).".to_string(),
        "- FAIL if explanations are generic, vague, or don't justify the grade (e.g. 'Bad.', 'It failed.', 'Good.' without reasoning).".to_string(),
        "- Empty or very short explanations (< 10 words) for fail grades should typically FAIL.".to_string(),
        String::new(),
        "First briefly explain your reasoning, then conclude with exactly one word on a new line: PASS or FAIL.".to_string(),
        "Your final line must be only PASS or FAIL—no other format.".to_string(),
    ]);
    lines.join("\n")
}

#[async_trait]
impl RuleHandler for HumanExplanationJustifiesGrade {
    fn id(&self) -> &'static str {
        "human_explanation_justifies_grade"
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
        let slots: Vec<Value> = snapshot
            .selected_hunts
            .iter()
            .take(4)
            .enumerate()
            .map(|(index, hunt)| {
                let human = snapshot.human_review_for(hunt.hunt_id);
                json!({
                    "slot": index + 1,
                    "hunt_id": hunt.hunt_id,
                    "grades": human.map(|r| r.grades.clone()).unwrap_or_default(),
                    "explanation": human.map(|r| clip(&r.explanation, 300)).unwrap_or_default(),
                })
            })
            .collect();
        Ok(Some(
            ReviewIssue::new(
                self.id(),
                format!(
                    "Council detected generic or non-substantive explanations. Votes: {}",
                    vote_summary(&outcome.votes)
                ),
            )
            .with_hint(
                "Provide concrete explanations that justify your grades. Reference criteria and specific issues in the response.",
            )
            .with_details(json!({
                "council_votes": council_votes_json(&outcome.votes),
                "slots": slots,
            })),
        ))
    }
}
