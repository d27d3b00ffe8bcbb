//! Council rule: the prompt must not request or encourage prohibited
//! content. Context-aware: a prompt *discussing* or *avoiding* a
//! prohibited topic passes; one requesting it fails.

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

/// Default prohibited-content categories; override per rule with the
/// `prohibited_text` param.
const DEFAULT_PROHIBITED: &str = "\
1) Sexual Content: sex, eroticism, pornography, rape, sexual violence, sexual content involving minors, incest, exploitation
2) Violence: killing, murder, assault, war, torture, physical harm, weapons used against people
3) Self-Harm: suicide, cutting, overdose, any self-injury
4) Crime: scams, fraud, hacking, theft, illegal activity
5) Terrorism & Extremism: extremist groups, attacks, propaganda
6) Abuse & Exploitation: child abuse, trafficking, coercion
7) Weapons & Drugs: guns, bombs, explosives, illegal drugs, manufacturing or use
8) Privacy & Surveillance Abuse: doxxing, stalking, tracking or exposing individuals";

pub struct SafetyContextAware;

pub fn council_prompt(snapshot: &TaskSnapshot, params: &Value) -> String {
    let prohibited = params
        .get("prohibited_text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .unwrap_or(DEFAULT_PROHIBITED);
    [
        "You are a safety reviewer. Check if the TASK PROMPT contains prohibited content.".to_string(),
        String::new(),
        "CRITICAL: Check CONTEXT and INTENT, not just word presence.".to_string(),
        String::new(),
        "PROHIBITED CONTENT (fail only if prompt REQUESTS or ENCOURAGES these):".to_string(),
        prohibited.to_string(),
        String::new(),
        "TASK PROMPT:".to_string(),
        if snapshot.prompt.is_empty() {
            "(none)".to_string()
        } else {
            clip(&snapshot.prompt, 2500)
        },
        String::new(),
        "CONTEXT RULES:".to_string(),
        "- FAIL if the prompt REQUESTS or ENCOURAGES generating prohibited content (e.g. 'Write erotic fiction', 'How to hack a bank').".to_string(),
        "- PASS if the prompt DISCUSSES or AVOIDS prohibited content (e.g. 'How to avoid sexual content in children's media', 'Discuss suicide prevention strategies').".to_string(),
        "- PASS for academic, hypothetical, or safety/guidance framing that does not encourage harmful use.".to_string(),
        "- When in doubt, prefer PASS to reduce false failures.".to_string(),
        String::new(),
        "First briefly explain your reasoning, then conclude with exactly one word on a new line: PASS or FAIL.".to_string(),
        "Your final line must be only PASS or FAIL—no other format.".to_string(),
    ]
    .join("\n")
}

#[async_trait]
impl RuleHandler for SafetyContextAware {
    fn id(&self) -> &'static str {
        "safety_context_aware"
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
        let prompt = council_prompt(snapshot, params);
        let outcome = ctx.run_council(&prompt, self.id()).await;
        if outcome.passed {
            return Ok(None);
        }
        Ok(Some(
            ReviewIssue::new(
                self.id(),
                format!(
                    "Council detected prohibited content in prompt (requesting/encouraging). Votes: {}",
                    vote_summary(&outcome.votes)
                ),
            )
            .with_hint(
                "The prompt appears to request or encourage prohibited content. Revise to discuss or avoid such topics without encouraging harmful use.",
            )
            .with_details(json!({
                "council_votes": council_votes_json(&outcome.votes),
                "prompt_preview": clip(&snapshot.prompt, 500),
            })),
        ))
    }
}
