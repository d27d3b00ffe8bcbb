use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use gauntlet_config::RuleDef;
use gauntlet_council::Council;
use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::ReviewResult;
use gauntlet_protocol::ReviewRunEvent;
use gauntlet_protocol::TaskSnapshot;

use crate::registry::RuleContext;
use crate::registry::RuleRegistry;
use crate::stream_payload::build_content_checked;
use crate::stream_payload::build_rationale;

struct EngineState {
    rules: Vec<RuleDef>,
    registry: RuleRegistry,
    council: Council,
}

/// Dispatches the configured rule set against task snapshots.
/// Cheap to clone.
#[derive(Clone)]
pub struct RuleEngine {
    state: Arc<EngineState>,
}

impl RuleEngine {
    /// Engine with the built-in handlers and the given rule set.
    pub fn new(rules: Vec<RuleDef>, council: Council) -> Self {
        Self::with_registry(rules, council, RuleRegistry::with_default_handlers())
    }

    pub fn with_registry(rules: Vec<RuleDef>, council: Council, registry: RuleRegistry) -> Self {
        Self {
            state: Arc::new(EngineState {
                rules,
                registry,
                council,
            }),
        }
    }

    fn applicable_rules(&self, snapshot: &TaskSnapshot) -> Vec<RuleDef> {
        self.state
            .rules
            .iter()
            .filter(|rule| rule.applies_to(snapshot.checkpoint))
            .cloned()
            .collect()
    }

    async fn evaluate_rule(
        &self,
        rule: &RuleDef,
        snapshot: &TaskSnapshot,
        ctx: &RuleContext,
    ) -> Option<ReviewIssue> {
        let Some(handler) = self.state.registry.get(&rule.id) else {
            warn!("rule `{}` is not registered — skipping", rule.id);
            return None;
        };
        match handler.evaluate(snapshot, &rule.params, ctx).await {
            Ok(issue) => issue,
            Err(err) => {
                warn!("rule `{}` failed: {err}", rule.id);
                Some(ReviewIssue::new(rule.id.clone(), format!("Rule error: {err}")).with_hint("Check logs."))
            }
        }
    }

    /// Run every applicable rule and aggregate the issues.
    pub async fn run_review(&self, snapshot: &TaskSnapshot) -> ReviewResult {
        let ctx = RuleContext::new(self.state.council.clone());
        let mut issues = Vec::new();
        for rule in self.applicable_rules(snapshot) {
            if let Some(issue) = self.evaluate_rule(&rule, snapshot, &ctx).await {
                issues.push(issue);
            }
        }
        ReviewResult::new(snapshot.checkpoint, issues)
    }

    /// Streaming run: narrates each rule over the returned channel
    /// (`rule_started`, any live council events, `rule_completed`) and
    /// finishes with `review_complete`.
    pub fn run_review_streaming(&self, snapshot: TaskSnapshot) -> mpsc::Receiver<ReviewRunEvent> {
        let (tx, rx) = mpsc::channel(256);
        let engine = self.clone();
        tokio::spawn(async move {
            let ctx = RuleContext::with_forwarding(engine.state.council.clone(), tx.clone());
            let mut issues = Vec::new();
            for rule in engine.applicable_rules(&snapshot) {
                let content_checked = build_content_checked(&rule.id, &snapshot);
                let _ = tx
                    .send(ReviewRunEvent::RuleStarted {
                        rule_id: rule.id.clone(),
                        content_checked: content_checked.clone(),
                    })
                    .await;

                let issue = engine.evaluate_rule(&rule, &snapshot, &ctx).await;
                let rationale = build_rationale(&rule.id, issue.as_ref(), &content_checked);
                let _ = tx
                    .send(ReviewRunEvent::RuleCompleted {
                        rule_id: rule.id.clone(),
                        passed: issue.is_none(),
                        rationale,
                        issue: issue.clone(),
                    })
                    .await;
                if let Some(issue) = issue {
                    issues.push(issue);
                }
            }
            let result = ReviewResult::new(snapshot.checkpoint, issues);
            let _ = tx.send(ReviewRunEvent::ReviewComplete { result }).await;
        });
        rx
    }
}
