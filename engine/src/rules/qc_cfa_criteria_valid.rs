//! Council rule: criteria validity for QC/CFA taxonomies.
//!
//! QC (Question Correction) criteria may reject the prompt's premise
//! and describe the correct answer that is not in the prompt; CFA
//! (Counterfactual Answering) criteria may reference imaginary
//! constraints. Neither is a defect. The council only fails criteria
//! that invent subjective golden answers or contradict the taxonomy.

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
use crate::rules::vote_summary;

const DEFAULT_TAXONOMIES: [&str; 2] = ["QC", "CFA"];

pub struct QcCfaCriteriaValid;

fn taxonomies_from(params: &Value) -> Vec<String> {
    params
        .get("taxonomies")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_uppercase)
                .collect()
        })
        .filter(|list: &Vec<String>| !list.is_empty())
        .unwrap_or_else(|| DEFAULT_TAXONOMIES.iter().map(|t| t.to_string()).collect())
}

pub fn council_prompt(snapshot: &TaskSnapshot, params: &Value) -> String {
    let taxonomies = taxonomies_from(params);
    let l1_taxonomy = snapshot.task_metadata.l1_taxonomy.clone();
    let mut lines = vec![
        "You are a QA reviewer. For QC (Question Correction) and CFA (Counterfactual Answering) taxonomies:".to_string(),
        String::new(),
        "SPECIAL RULES:".to_string(),
        "- QC: Criteria may REJECT the prompt's premise and describe the CORRECT answer that is NOT in the prompt.".to_string(),
        "- CFA: Criteria may reference counterfactual/imaginary elements not explicitly in the prompt.".to_string(),
        "- This is EXPECTED — do NOT fail just because criteria reference what's not in the prompt.".to_string(),
        "- FAIL only if criteria invent subjective 'golden answers' or are inconsistent with the taxonomy.".to_string(),
        String::new(),
        format!(
            "L1 Taxonomy: {}",
            if l1_taxonomy.is_empty() {
                "(not set)".to_string()
            } else {
                l1_taxonomy.clone()
            }
        ),
        String::new(),
        "TASK PROMPT:".to_string(),
        if snapshot.prompt.is_empty() {
            "(none)".to_string()
        } else {
            clip(&snapshot.prompt, 1500)
        },
        String::new(),
        "REFERENCE / CRITERIA:".to_string(),
        if snapshot.reference.is_empty() {
            "(none)".to_string()
        } else {
            clip(&snapshot.reference, 1500)
        },
        String::new(),
        "CRITERIA (extracted):".to_string(),
    ];
    for criterion in &snapshot.criteria {
        lines.push(format!(
            "  - {}: {}",
            criterion.id,
            clip(&criterion.description, 300)
        ));
    }
    lines.push(String::new());

    if taxonomies.contains(&l1_taxonomy.to_uppercase()) {
        lines.push(format!(
            "Since taxonomy is {l1_taxonomy}, criteria may legitimately reference what's not in the prompt."
        ));
        lines.push("- PASS if criteria are valid for QC/CFA (reference correct answer, counterfactuals, etc.) and don't invent subjective golden answers.".to_string());
        lines.push("- FAIL if criteria are inconsistent, invent arbitrary standards, or don't fit the taxonomy.".to_string());
    } else {
        lines.push("Taxonomy is not QC or CFA. Apply standard criteria validity.".to_string());
        lines.push("- PASS if criteria are clear and consistent with the prompt.".to_string());
        lines.push("- FAIL if criteria are vague, inconsistent, or invent golden answers.".to_string());
    }
    lines.push(String::new());
    lines.push("First briefly explain your reasoning, then conclude with exactly one word on a new line: PASS or FAIL.".to_string());
    lines.push("Your final line must be only PASS or FAIL—no other format.".to_string());
    lines.join("\n")
}

#[async_trait]
impl RuleHandler for QcCfaCriteriaValid {
    fn id(&self) -> &'static str {
        "qc_cfa_criteria_valid"
    }

    async fn evaluate(
        &self,
        snapshot: &TaskSnapshot,
        params: &Value,
        ctx: &RuleContext,
    ) -> Result<Option<ReviewIssue>, RuleError> {
        if snapshot.checkpoint != Checkpoint::Final {
            return Ok(None);
        }
        if snapshot.task_metadata.l1_taxonomy.trim().is_empty() || snapshot.criteria.is_empty() {
            return Ok(None);
        }
        let prompt = council_prompt(snapshot, params);
        let outcome = ctx.run_council(&prompt, self.id()).await;
        if outcome.passed {
            return Ok(None);
        }
        Ok(Some(
            ReviewIssue::new(
                self.id(),
                format!(
                    "Council detected invalid or inconsistent criteria for {}. Votes: {}",
                    snapshot.task_metadata.l1_taxonomy,
                    vote_summary(&outcome.votes)
                ),
            )
            .with_hint(
                "Ensure criteria are valid for QC/CFA: they may reference what's not in the prompt, but should not invent subjective golden answers.",
            )
            .with_details(json!({
                "council_votes": council_votes_json(&outcome.votes),
                "l1_taxonomy": snapshot.task_metadata.l1_taxonomy,
                "criteria": snapshot.criteria.iter().map(|c| json!({
                    "id": c.id,
                    "description": clip(&c.description, 200),
                })).collect::<Vec<_>>(),
            })),
        ))
    }
}
