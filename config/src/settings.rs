use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use gauntlet_protocol::Checkpoint;

use crate::team::TeamConfig;

/// Root configuration. All sections default so partial files load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GauntletConfig {
    pub session: SessionTtlConfig,
    pub idempotency: IdempotencyConfig,
    pub presence: PresenceConfig,
    pub bulk_actions: BulkActionsConfig,
    pub review: ReviewConfig,
    pub resilience: ResilienceConfig,
    pub rate_limits: RateLimitsConfig,
    pub task_identity: TaskIdentityConfig,
    pub llm: LlmConfig,
    pub agentic: AgenticConfig,
    pub team: TeamConfig,
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTtlConfig {
    pub ttl_seconds: u64,
}

impl Default for SessionTtlConfig {
    fn default() -> Self {
        Self { ttl_seconds: 14400 }
    }
}

impl SessionTtlConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub ttl_hours: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub ttl_seconds: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { ttl_seconds: 30 }
    }
}

impl PresenceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkActionsConfig {
    pub max_batch_size: usize,
}

impl Default for BulkActionsConfig {
    fn default() -> Self {
        Self { max_batch_size: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub max_rounds: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self { max_rounds: 3 }
    }
}

/// Retry schedule for transient store and transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry_attempts: u32,
    pub retry_base_delay: f64,
    pub retry_max_delay: f64,
    pub retry_backoff_factor: f64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_delay: 1.0,
            retry_max_delay: 30.0,
            retry_backoff_factor: 2.0,
        }
    }
}

/// Concurrent outbound model calls allowed per provider. The `default`
/// entry applies to providers without an explicit limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimitsConfig {
    pub limits: BTreeMap<String, usize>,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let mut limits = BTreeMap::new();
        limits.insert("openrouter".to_string(), 10);
        limits.insert("default".to_string(), 6);
        Self { limits }
    }
}

impl RateLimitsConfig {
    pub fn limit_for(&self, provider: &str) -> usize {
        self.limits
            .get(provider)
            .or_else(|| self.limits.get("default"))
            .copied()
            .unwrap_or(6)
            .max(1)
    }
}

/// Which notebook metadata field names the human-readable task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskIdentityConfig {
    pub display_id_field: String,
    pub display_id_label: String,
    pub fallback_fields: Vec<String>,
}

impl Default for TaskIdentityConfig {
    fn default() -> Self {
        Self {
            display_id_field: "Task ID".to_string(),
            display_id_label: "Task ID".to_string(),
            fallback_fields: vec!["TaskID".to_string(), "task_id".to_string()],
        }
    }
}

impl TaskIdentityConfig {
    /// Primary field followed by fallbacks, in lookup order.
    pub fn lookup_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.display_id_field.as_str()];
        fields.extend(self.fallback_fields.iter().map(String::as_str));
        fields
    }
}

/// Model transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub connect_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
    pub max_tokens: u32,
    pub chairman_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            connect_timeout_seconds: 5,
            read_timeout_seconds: 120,
            max_tokens: 512,
            chairman_max_tokens: 1024,
        }
    }
}

impl LlmConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }
}

/// Declarative rule definition dispatched by the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_checkpoints")]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub params: Value,
}

fn default_true() -> bool {
    true
}

fn default_checkpoints() -> Vec<Checkpoint> {
    vec![Checkpoint::Preflight, Checkpoint::Final]
}

impl RuleDef {
    pub fn applies_to(&self, checkpoint: Checkpoint) -> bool {
        self.enabled && self.checkpoints.contains(&checkpoint)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    #[default]
    Majority,
    Unanimity,
    Chairman,
}

/// A judge model entry. Accepts either a bare model id string or a
/// `{id, enabled}` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CouncilModel {
    Bare(String),
    Full {
        id: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl CouncilModel {
    pub fn id(&self) -> &str {
        match self {
            CouncilModel::Bare(id) => id,
            CouncilModel::Full { id, .. } => id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            CouncilModel::Bare(_) => true,
            CouncilModel::Full { enabled, .. } => *enabled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    pub models: Vec<CouncilModel>,
    pub consensus: ConsensusMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chairman_model: Option<String>,
}

impl CouncilConfig {
    /// Ids of the judges that will actually be called.
    pub fn enabled_models(&self) -> Vec<String> {
        self.models
            .iter()
            .filter(|m| m.enabled())
            .map(|m| m.id().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgenticConfig {
    pub rules: Vec<RuleDef>,
    pub council: CouncilConfig,
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            council: CouncilConfig::default(),
        }
    }
}

/// The stock rule set, used when the config file declares none.
/// `diversity` exists as an alternative selection policy and stays
/// disabled here because it contradicts `model_consistency`.
fn default_rules() -> Vec<RuleDef> {
    let preflight = vec![Checkpoint::Preflight];
    let both = vec![Checkpoint::Preflight, Checkpoint::Final];
    let final_only = vec![Checkpoint::Final];
    let rule = |id: &str, enabled: bool, checkpoints: &[Checkpoint]| RuleDef {
        id: id.to_string(),
        enabled,
        checkpoints: checkpoints.to_vec(),
        params: Value::Null,
    };
    vec![
        rule("selection_count", true, &preflight),
        rule("model_consistency", true, &both),
        rule("diversity", false, &preflight),
        rule("criteria_present", true, &both),
        rule("human_llm_grade_alignment", true, &final_only),
        rule("metadata_prompt_alignment", true, &final_only),
        rule("metadata_taxonomy_alignment", true, &final_only),
        rule("human_explanation_justifies_grade", true, &final_only),
        rule("safety_context_aware", true, &final_only),
        rule("qc_cfa_criteria_valid", true, &final_only),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub openrouter_api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_values() {
        let config = GauntletConfig::default();
        assert_eq!(config.session.ttl_seconds, 14400);
        assert_eq!(config.idempotency.ttl_hours, 24);
        assert_eq!(config.presence.ttl_seconds, 30);
        assert_eq!(config.bulk_actions.max_batch_size, 4);
        assert_eq!(config.review.max_rounds, 3);
        assert_eq!(config.resilience.retry_attempts, 3);
        assert_eq!(config.rate_limits.limit_for("openrouter"), 10);
        assert_eq!(config.rate_limits.limit_for("unknown"), 6);
    }

    #[test]
    fn rule_filtering_by_checkpoint() {
        let rules = default_rules();
        let preflight: Vec<&str> = rules
            .iter()
            .filter(|r| r.applies_to(Checkpoint::Preflight))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(
            preflight,
            ["selection_count", "model_consistency", "criteria_present"]
        );
        assert!(
            rules
                .iter()
                .filter(|r| r.applies_to(Checkpoint::Final))
                .count()
                > 3
        );
    }

    #[test]
    fn council_model_entries_accept_both_shapes() {
        let config: CouncilConfig = serde_yaml::from_str(
            r#"
models:
  - "judge-a"
  - { id: "judge-b", enabled: false }
  - { id: "judge-c" }
consensus: chairman
chairman_model: "chair-d"
"#,
        )
        .unwrap();
        assert_eq!(config.enabled_models(), ["judge-a", "judge-c"]);
        assert_eq!(config.consensus, ConsensusMode::Chairman);
    }
}
