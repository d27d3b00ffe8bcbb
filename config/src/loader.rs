use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_yaml::Value;
use thiserror::Error;
use tracing::warn;

use crate::settings::GauntletConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Matches `${VAR}` and `${VAR:-default}`.
fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap_or_else(|_| unreachable!())
    })
}

/// Replace environment references inside a string value. Unset
/// variables without a default resolve to the empty string.
fn resolve_env_str(raw: &str) -> String {
    env_pattern()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            }
        })
        .into_owned()
}

/// Recursively resolve environment references in every string of a
/// parsed YAML document. Non-strings pass through untouched.
fn resolve_env(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_env_str(&s)),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(resolve_env).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| (key, resolve_env(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Load configuration from a YAML file. A missing file yields the
/// default configuration with a warning rather than an error.
pub fn load(path: &Path) -> Result<GauntletConfig, ConfigError> {
    if !path.exists() {
        warn!("config not found at {}; using defaults", path.display());
        return Ok(GauntletConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_from_str(&raw)
}

/// Parse configuration from YAML text, resolving `${VAR}` references.
pub fn load_from_str(raw: &str) -> Result<GauntletConfig, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(GauntletConfig::default());
    }
    let value: Value = serde_yaml::from_str(raw)?;
    let resolved = resolve_env(value);
    Ok(serde_yaml::from_value(resolved)?)
}
