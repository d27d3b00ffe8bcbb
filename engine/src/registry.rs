//! Explicit rule registry.
//!
//! Handlers are registered once at startup from a declared list; there
//! is no runtime discovery. Each handler receives the snapshot, its
//! configured params, and a [`RuleContext`] through which council-backed
//! rules reach the judges.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use gauntlet_council::Council;
use gauntlet_council::CouncilOutcome;
use gauntlet_protocol::CouncilEvent;
use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::ReviewRunEvent;
use gauntlet_protocol::TaskSnapshot;

use crate::rules;

/// A handler failure. The engine converts these into synthetic issues
/// rather than failing the run.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RuleError(pub String);

/// Services available to a rule while it evaluates.
pub struct RuleContext {
    council: Council,
    forward: Option<mpsc::Sender<ReviewRunEvent>>,
}

impl RuleContext {
    pub fn new(council: Council) -> Self {
        Self {
            council,
            forward: None,
        }
    }

    /// A context that forwards council events live to a review-run
    /// channel, tagged with the rule that produced them.
    pub fn with_forwarding(council: Council, tx: mpsc::Sender<ReviewRunEvent>) -> Self {
        Self {
            council,
            forward: Some(tx),
        }
    }

    /// Put a prompt to the council. In a streaming run the judges'
    /// events are forwarded as they happen; either way the caller gets
    /// the aggregated outcome.
    pub async fn run_council(&self, prompt: &str, rule_id: &str) -> CouncilOutcome {
        match &self.forward {
            None => self.council.run(prompt, rule_id).await,
            Some(tx) => {
                let mut rx = self.council.run_streaming(prompt, rule_id);
                let mut outcome = CouncilOutcome {
                    passed: true,
                    votes: Vec::new(),
                };
                while let Some(event) = rx.recv().await {
                    if let CouncilEvent::Complete { passed, votes } = &event {
                        outcome = CouncilOutcome {
                            passed: *passed,
                            votes: votes.clone(),
                        };
                    }
                    let _ = tx
                        .send(ReviewRunEvent::Council {
                            rule_id: rule_id.to_string(),
                            event,
                        })
                        .await;
                }
                outcome
            }
        }
    }
}

/// One rule implementation: `(snapshot, params) -> issue or clean`.
#[async_trait]
pub trait RuleHandler: Send + Sync {
    fn id(&self) -> &'static str;

    /// Evaluate the rule. `Ok(None)` means the rule passed or does not
    /// apply to this snapshot.
    async fn evaluate(
        &self,
        snapshot: &TaskSnapshot,
        params: &Value,
        ctx: &RuleContext,
    ) -> Result<Option<ReviewIssue>, RuleError>;
}

/// Rule id to handler table, fixed after startup.
#[derive(Default)]
pub struct RuleRegistry {
    handlers: HashMap<&'static str, Arc<dyn RuleHandler>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in rule.
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        for handler in rules::default_handlers() {
            registry.register(handler);
        }
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn RuleHandler>) {
        self.handlers.insert(handler.id(), handler);
    }

    pub fn get(&self, rule_id: &str) -> Option<Arc<dyn RuleHandler>> {
        self.handlers.get(rule_id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
