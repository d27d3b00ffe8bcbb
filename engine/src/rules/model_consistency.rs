//! All four selected responses must come from the same model.

use async_trait::async_trait;
use serde_json::Value;

use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::TaskSnapshot;

use crate::registry::RuleContext;
use crate::registry::RuleError;
use crate::registry::RuleHandler;

pub struct ModelConsistency;

#[async_trait]
impl RuleHandler for ModelConsistency {
    fn id(&self) -> &'static str {
        "model_consistency"
    }

    async fn evaluate(
        &self,
        snapshot: &TaskSnapshot,
        _params: &Value,
        _ctx: &RuleContext,
    ) -> Result<Option<ReviewIssue>, RuleError> {
        if snapshot.selected_hunts.len() < 4 {
            return Ok(Some(
                ReviewIssue::new(self.id(), "Exactly 4 responses must be selected.")
                    .with_hint("Select exactly 4 responses for review."),
            ));
        }
        let models = snapshot.selected_models();
        if models.len() == 1 {
            return Ok(None);
        }
        Ok(Some(
            ReviewIssue::new(
                self.id(),
                format!(
                    "All 4 selected responses must be from the same model. Found: {} models ({}).",
                    models.len(),
                    models.join(", ")
                ),
            )
            .with_hint("Re-select 4 responses from a single model."),
        ))
    }
}
