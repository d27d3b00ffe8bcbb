//! Exactly the expected number of responses must be selected.

use async_trait::async_trait;
use serde_json::Value;

use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::TaskSnapshot;

use crate::registry::RuleContext;
use crate::registry::RuleError;
use crate::registry::RuleHandler;

pub struct SelectionCount;

#[async_trait]
impl RuleHandler for SelectionCount {
    fn id(&self) -> &'static str {
        "selection_count"
    }

    async fn evaluate(
        &self,
        snapshot: &TaskSnapshot,
        params: &Value,
        _ctx: &RuleContext,
    ) -> Result<Option<ReviewIssue>, RuleError> {
        let expected = params
            .get("expected_count")
            .and_then(Value::as_u64)
            .unwrap_or(4) as usize;
        let actual = snapshot.selected_hunts.len();
        if actual == expected {
            return Ok(None);
        }
        Ok(Some(
            ReviewIssue::new(
                self.id(),
                format!("Expected {expected} selected responses, got {actual}."),
            )
            .with_hint("Select exactly 4 responses for review."),
        ))
    }
}
