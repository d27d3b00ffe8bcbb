//! Rich payloads for the streaming review run: what a rule is checking
//! (shown while it runs) and a human-readable rationale for its result.

use serde_json::Value;
use serde_json::json;

use gauntlet_protocol::ReviewIssue;
use gauntlet_protocol::TaskSnapshot;

use crate::rules::clip;

/// A compact projection of the snapshot slice a rule inspects, keyed to
/// the rule id. Unknown rules get a bare `{check: rule_id}`.
pub fn build_content_checked(rule_id: &str, snapshot: &TaskSnapshot) -> Value {
    match rule_id {
        "model_consistency" => {
            let models: Vec<&str> = snapshot
                .selected_hunts
                .iter()
                .take(4)
                .map(|h| h.model.as_str())
                .collect();
            json!({
                "check": "All 4 selected responses must be from the same model",
                "models": models,
                "models_count": snapshot.selected_models().len(),
            })
        }
        "human_llm_grade_alignment" => {
            let slots: Vec<Value> = snapshot
                .selected_hunts
                .iter()
                .take(4)
                .enumerate()
                .map(|(index, hunt)| {
                    let human = snapshot.human_review_for(hunt.hunt_id);
                    json!({
                        "slot": index + 1,
                        "model": hunt.model,
                        "human_grades": human.map(|r| r.grades.clone()).unwrap_or_default(),
                        "human_explanation_preview": human
                            .map(|r| clip(&r.explanation, 150))
                            .unwrap_or_default(),
                        "llm_criteria": hunt.judge_criteria,
                    })
                })
                .collect();
            json!({
                "check": "Human grades vs LLM judge — flag large disagreements",
                "slots": slots,
                "criteria": snapshot.criteria.iter().map(|c| json!({
                    "id": c.id,
                    "desc": clip(&c.description, 100),
                })).collect::<Vec<_>>(),
                "prompt_preview": clip(&snapshot.prompt, 300),
            })
        }
        "metadata_prompt_alignment" | "metadata_taxonomy_alignment" => {
            let meta = &snapshot.task_metadata;
            let or_dash = |s: &str| if s.is_empty() { "—" } else { s }.to_string();
            json!({
                "check": format!(
                    "Metadata: Domain={}, Use Case={}, L1={}",
                    or_dash(&meta.domain),
                    or_dash(&meta.use_case),
                    or_dash(&meta.l1_taxonomy),
                ),
                "prompt_preview": clip(&snapshot.prompt, 300),
            })
        }
        "human_explanation_justifies_grade" => {
            let slots: Vec<Value> = snapshot
                .selected_hunts
                .iter()
                .take(4)
                .enumerate()
                .map(|(index, hunt)| {
                    let explanation = snapshot
                        .human_review_for(hunt.hunt_id)
                        .map(|r| clip(&r.explanation, 300))
                        .unwrap_or_default();
                    json!({ "slot": index + 1, "model": hunt.model, "explanation": explanation })
                })
                .collect();
            json!({ "check": "Human explanations must be substantive", "slots": slots })
        }
        "safety_context_aware" => json!({
            "check": "Prompt must not request prohibited content (context-aware)",
            "prompt_preview": clip(&snapshot.prompt, 300),
        }),
        "qc_cfa_criteria_valid" => {
            let l1 = &snapshot.task_metadata.l1_taxonomy;
            json!({
                "check": format!(
                    "QC/CFA criteria validity (L1={})",
                    if l1.is_empty() { "—" } else { l1 }
                ),
                "criteria": snapshot.criteria.iter().map(|c| json!({
                    "id": c.id,
                    "desc": clip(&c.description, 80),
                })).collect::<Vec<_>>(),
            })
        }
        other => json!({ "check": other }),
    }
}

/// Human-readable line for a completed rule: the issue message when it
/// failed, otherwise a rule-specific all-clear.
pub fn build_rationale(rule_id: &str, issue: Option<&ReviewIssue>, content_checked: &Value) -> String {
    if let Some(issue) = issue {
        return issue.message.clone();
    }
    match rule_id {
        "model_consistency" => {
            let models: Vec<&str> = content_checked
                .get("models")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let distinct = content_checked
                .get("models_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if distinct == 1 && !models.is_empty() {
                format!("All 4 responses from same model: {}", models[0])
            } else if models.is_empty() {
                "Models found: none".to_string()
            } else {
                format!("Models found: {}", models.join(", "))
            }
        }
        "human_llm_grade_alignment" => {
            "Council agreed: human and LLM grading are aligned.".to_string()
        }
        _ => "Check completed.".to_string(),
    }
}
