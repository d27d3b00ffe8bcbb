use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::review::ReviewIssue;
use crate::review::ReviewResult;
use crate::status::Verdict;

/// One judge's final position, carried in `CouncilEvent::Complete` and
/// in issue details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilVote {
    pub model: String,
    pub verdict: Verdict,
}

/// Ordered events emitted by a streaming council run.
///
/// For each judge in turn: `ModelStart`, zero or more `ModelChunk`s,
/// then `ModelVerdict`. When consensus is chairman, `ChairmanStart` and
/// `ChairmanVerdict` follow the last judge. `Complete` always ends the
/// stream and carries the judges' original votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouncilEvent {
    Prompt { text: String },
    ModelStart { model: String },
    ModelChunk { model: String, text: String },
    ModelVerdict {
        model: String,
        verdict: Verdict,
        full_text: String,
    },
    ChairmanStart { model: String },
    ChairmanVerdict { passed: bool, rationale: String },
    Complete {
        passed: bool,
        votes: Vec<CouncilVote>,
    },
}

/// Ordered events emitted by a streaming review run.
///
/// Each rule contributes `RuleStarted`, any council events tagged with
/// the rule id, and `RuleCompleted`; the run ends with
/// `ReviewComplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewRunEvent {
    RuleStarted {
        rule_id: String,
        /// Compact projection of the snapshot slice this rule checks.
        content_checked: Value,
    },
    Council {
        rule_id: String,
        event: CouncilEvent,
    },
    RuleCompleted {
        rule_id: String,
        passed: bool,
        rationale: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue: Option<ReviewIssue>,
    },
    ReviewComplete { result: ReviewResult },
}

/// Entry in the per-session append-only event log consumed over SSE.
///
/// `event_type` values `complete` and `error` are terminal and end any
/// live subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunt_id: Option<u32>,
    #[serde(default)]
    pub data: Value,
}

impl SessionEvent {
    pub fn new(event_type: impl Into<String>, hunt_id: Option<u32>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            hunt_id,
            data,
        }
    }

    /// True when this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type.as_str(), "complete" | "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn council_event_wire_format_is_tagged() {
        let event = CouncilEvent::ModelVerdict {
            model: "judge-a".to_string(),
            verdict: Verdict::Pass,
            full_text: "looks good\nPASS".to_string(),
        };
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "model_verdict");
        assert_eq!(json["verdict"], "pass");
    }

    #[test]
    fn terminal_session_events() {
        assert!(SessionEvent::new("complete", None, Value::Null).is_terminal());
        assert!(SessionEvent::new("error", Some(3), Value::Null).is_terminal());
        assert!(!SessionEvent::new("hunt_progress", Some(3), Value::Null).is_terminal());
    }
}
