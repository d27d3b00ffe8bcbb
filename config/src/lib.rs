//! Configuration for the Gauntlet review pipeline.
//!
//! One YAML file drives the whole system: session/idempotency/presence
//! TTLs, review rounds, bulk-action caps, retry policy, per-provider
//! rate limits, task-identity extraction, the agentic rule set and
//! council, the team directory, and secrets. `${VAR}` and
//! `${VAR:-default}` references in string values are resolved from the
//! environment at load time. Every section is serde-defaulted, so a
//! missing file yields a working development configuration.

mod loader;
mod settings;
mod team;

pub use loader::ConfigError;
pub use loader::load;
pub use loader::load_from_str;
pub use settings::AgenticConfig;
pub use settings::BulkActionsConfig;
pub use settings::ConsensusMode;
pub use settings::CouncilConfig;
pub use settings::CouncilModel;
pub use settings::GauntletConfig;
pub use settings::IdempotencyConfig;
pub use settings::LlmConfig;
pub use settings::PresenceConfig;
pub use settings::RateLimitsConfig;
pub use settings::ResilienceConfig;
pub use settings::ReviewConfig;
pub use settings::RuleDef;
pub use settings::SecretsConfig;
pub use settings::SessionTtlConfig;
pub use settings::TaskIdentityConfig;
pub use team::Pod;
pub use team::QueueScope;
pub use team::Role;
pub use team::TeamConfig;
pub use team::TeamDirectory;
