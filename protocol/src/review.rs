use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::now_iso;
use crate::status::Checkpoint;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    #[default]
    Error,
    Warning,
}

/// One finding from a rule. A rule that passes produces no issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub rule_id: String,
    #[serde(default)]
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default)]
    pub hint: String,
    /// Rule-specific payload for the evaluation UI: council votes, slot
    /// comparisons, previews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ReviewIssue {
    pub fn new(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity: IssueSeverity::Error,
            message: message.into(),
            hint: String::new(),
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Aggregated outcome of a rule-engine run; `passed` iff no issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub passed: bool,
    pub issues: Vec<ReviewIssue>,
    pub checkpoint: Checkpoint,
    pub timestamp: String,
}

impl ReviewResult {
    pub fn new(checkpoint: Checkpoint, issues: Vec<ReviewIssue>) -> Self {
        Self {
            passed: issues.is_empty(),
            issues,
            checkpoint,
            timestamp: now_iso(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn result_passes_only_without_issues() {
        let clean = ReviewResult::new(Checkpoint::Preflight, vec![]);
        assert!(clean.passed);

        let flagged = ReviewResult::new(
            Checkpoint::Preflight,
            vec![ReviewIssue::new("selection_count", "Expected 4, got 3.")],
        );
        assert!(!flagged.passed);
        assert_eq!(flagged.issues[0].severity, IssueSeverity::Error);
    }
}
