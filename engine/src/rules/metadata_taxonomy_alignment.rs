//! Council rule: the L1 Taxonomy must be semantically consistent with
//! the Domain and Use Case.

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

pub struct MetadataTaxonomyAlignment;

fn applies(snapshot: &TaskSnapshot) -> bool {
    snapshot.checkpoint == Checkpoint::Final && !snapshot.task_metadata.l1_taxonomy.is_empty()
}

pub fn council_prompt(snapshot: &TaskSnapshot) -> String {
    let meta = &snapshot.task_metadata;
    let or_empty = |s: &str| {
        if s.is_empty() {
            "(empty)".to_string()
        } else {
            s.to_string()
        }
    };
    [
        "You are a QA reviewer. Check if the L1 Taxonomy is consistent with the Domain and Use Case.".to_string(),
        String::new(),
        "CLAIMED METADATA:".to_string(),
        format!("  Domain: {}", or_empty(&meta.domain)),
        format!("  Use Case: {}", or_empty(&meta.use_case)),
        format!("  L1 Taxonomy: {}", or_empty(&meta.l1_taxonomy)),
        String::new(),
        "TASK PROMPT (for context):".to_string(),
        if snapshot.prompt.is_empty() {
            "(none)".to_string()
        } else {
            clip(&snapshot.prompt, 1000)
        },
        String::new(),
        "Evaluate in CONTEXT:".to_string(),
        "- L1 Taxonomy should semantically align with the Domain and Use Case.".to_string(),
        "- E.g. Healthcare + Patient Care + QC (Question Correction) can be consistent.".to_string(),
        "- E.g. Finance + Fraud Detection + CFA (Counterfactual Answering) can be consistent.".to_string(),
        "- PASS if the taxonomy reasonably fits the domain/use case.".to_string(),
        "- FAIL if the taxonomy clearly contradicts or is unrelated to the domain/use case.".to_string(),
        String::new(),
        "First briefly explain your reasoning, then conclude with exactly one word on a new line: PASS or FAIL.".to_string(),
        "Your final line must be only PASS or FAIL—no other format.".to_string(),
    ]
    .join("\n")
}

#[async_trait]
impl RuleHandler for MetadataTaxonomyAlignment {
    fn id(&self) -> &'static str {
        "metadata_taxonomy_alignment"
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
                    "Council detected inconsistency between L1 Taxonomy and Domain/Use Case. Votes: {}",
                    vote_summary(&outcome.votes)
                ),
            )
            .with_hint("Ensure the L1 Taxonomy aligns with the Domain and Use Case in notebook metadata.")
            .with_details(json!({
                "council_votes": council_votes_json(&outcome.votes),
                "domain": snapshot.task_metadata.domain,
                "use_case": snapshot.task_metadata.use_case,
                "l1_taxonomy": snapshot.task_metadata.l1_taxonomy,
            })),
        ))
    }
}
