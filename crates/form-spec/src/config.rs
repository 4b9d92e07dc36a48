use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONDITIONAL_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_CUSTOM_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_MAX_SCRIPT_DEPTH: usize = 200;

/// Engine settings. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Budget for `customConditional` scripts.
    pub conditional_timeout_ms: u64,
    /// Budget for `validate.custom` scripts.
    pub custom_timeout_ms: u64,
    /// Maximum syntactic nesting accepted by the script parser.
    pub max_script_depth: usize,
    /// Remove `<type>.hidden` issues from the final list instead of reporting them.
    pub drop_hidden_issues: bool,
    /// Message template overrides keyed by rule name (`required`, `maxWords`, ...).
    pub messages: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conditional_timeout_ms: DEFAULT_CONDITIONAL_TIMEOUT_MS,
            custom_timeout_ms: DEFAULT_CUSTOM_TIMEOUT_MS,
            max_script_depth: DEFAULT_MAX_SCRIPT_DEPTH,
            drop_hidden_issues: false,
            messages: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(ConfigError::Parse)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn conditional_timeout(&self) -> Duration {
        Duration::from_millis(self.conditional_timeout_ms)
    }

    pub fn custom_timeout(&self) -> Duration {
        Duration::from_millis(self.custom_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_partial_configs_use_defaults() {
        assert_eq!(EngineConfig::from_json_str("").expect("empty"), EngineConfig::default());

        let config = EngineConfig::from_json_str(r#"{"customTimeoutMs": 40}"#).expect("partial");
        assert_eq!(config.custom_timeout(), Duration::from_millis(40));
        assert_eq!(config.conditional_timeout_ms, DEFAULT_CONDITIONAL_TIMEOUT_MS);
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let err = EngineConfig::from_json_str("{ nope").expect_err("invalid");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
