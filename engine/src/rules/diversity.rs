//! Alternative selection policy: responses from at least N distinct
//! models. Contradicts `model_consistency`; config enables one or the
//! other.

use async_trait::async_trait;
use serde_json::Value;

use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::TaskSnapshot;

use crate::registry::RuleContext;
use crate::registry::RuleError;
use crate::registry::RuleHandler;

pub struct Diversity;

#[async_trait]
impl RuleHandler for Diversity {
    fn id(&self) -> &'static str {
        "diversity"
    }

    async fn evaluate(
        &self,
        snapshot: &TaskSnapshot,
        params: &Value,
        _ctx: &RuleContext,
    ) -> Result<Option<ReviewIssue>, RuleError> {
        let min_models = params
            .get("min_models")
            .and_then(Value::as_u64)
            .unwrap_or(2) as usize;
        let models = snapshot.selected_models();
        if models.len() >= min_models {
            return Ok(None);
        }
        Ok(Some(
            ReviewIssue::new(
                self.id(),
                format!(
                    "Only {} model(s) in selection. Need at least {min_models}.",
                    models.len()
                ),
            )
            .with_hint("Select responses from different models for better diversity."),
        ))
    }
}
