//! Council rule: the prompt's content must match the claimed Domain and
//! Use Case. Context-aware: meaning and intent, not keyword presence.

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

pub struct MetadataPromptAlignment;

fn applies(snapshot: &TaskSnapshot) -> bool {
    snapshot.checkpoint == Checkpoint::Final
        && !(snapshot.task_metadata.domain.is_empty() && snapshot.task_metadata.use_case.is_empty())
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
        "You are a QA reviewer. Check if the TASK PROMPT content aligns with the claimed Domain and Use Case.".to_string(),
        String::new(),
        "CLAIMED METADATA:".to_string(),
        format!("  Domain: {}", or_empty(&meta.domain)),
        format!("  Use Case: {}", or_empty(&meta.use_case)),
        String::new(),
        "TASK PROMPT:".to_string(),
        if snapshot.prompt.is_empty() {
            "(none)".to_string()
        } else {
            clip(&snapshot.prompt, 2000)
        },
        String::new(),
        "Evaluate in CONTEXT:".to_string(),
        "- Consider the meaning and intent of the prompt, not just keyword presence.".to_string(),
        "- A prompt about 'Healthcare' discussing patient care aligns with Healthcare domain.".to_string(),
        "- A prompt about 'avoiding sensitive topics' aligns with safety/guidance use cases.".to_string(),
        "- PASS if the prompt content is reasonably consistent with the claimed Domain and Use Case.".to_string(),
        "- FAIL if the prompt clearly belongs to a different domain/use case, or contradicts the metadata.".to_string(),
        String::new(),
        "First briefly explain your reasoning, then conclude with exactly one word on a new line: PASS or FAIL.".to_string(),
        "Your final line must be only PASS or FAIL—no other format.".to_string(),
    ]
    .join("\n")
}

#[async_trait]
impl RuleHandler for MetadataPromptAlignment {
    fn id(&self) -> &'static str {
        "metadata_prompt_alignment"
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
                    "Council detected misalignment between prompt content and claimed metadata. Votes: {}",
                    vote_summary(&outcome.votes)
                ),
            )
            .with_hint(
                "Ensure the prompt content matches the Domain and Use Case in notebook metadata, or update the metadata.",
            )
            .with_details(json!({
                "council_votes": council_votes_json(&outcome.votes),
                "domain": snapshot.task_metadata.domain,
                "use_case": snapshot.task_metadata.use_case,
                "prompt_preview": clip(&snapshot.prompt, 500),
            })),
        ))
    }
}
