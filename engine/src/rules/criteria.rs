//! The reference must define at least one criterion.

use async_trait::async_trait;
use serde_json::Value;

use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::TaskSnapshot;

use crate::registry::RuleContext;
use crate::registry::RuleError;
use crate::registry::RuleHandler;

pub struct CriteriaPresent;

#[async_trait]
impl RuleHandler for CriteriaPresent {
    fn id(&self) -> &'static str {
        "criteria_present"
    }

    async fn evaluate(
        &self,
        snapshot: &TaskSnapshot,
        _params: &Value,
        _ctx: &RuleContext,
    ) -> Result<Option<ReviewIssue>, RuleError> {
        if !snapshot.criteria.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            ReviewIssue::new(self.id(), "No criteria defined in the reference.").with_hint(
                r#"Add criteria in JSON format [{"id":"C1","criteria1":"..."}] or plain C1: desc."#,
            ),
        ))
    }
}
