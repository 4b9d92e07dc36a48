use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single validation finding, structural or field-level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub message: String,
    /// Rule that produced the issue, e.g. `string.custom` or `unique component keys`.
    #[serde(rename = "type")]
    pub kind: String,
    pub path: Vec<String>,
}

impl ValidationIssue {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            path,
        }
    }

    /// Issue that stands in for errors on a conditionally hidden field.
    pub fn is_hidden(&self) -> bool {
        self.kind.ends_with(".hidden")
    }

    /// Rule name without the base-type prefix (`string.maxWords` -> `maxWords`).
    pub fn rule(&self) -> &str {
        self.kind
            .split_once('.')
            .map(|(_, rule)| rule)
            .unwrap_or(&self.kind)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}] {}", self.kind, self.message)
        } else {
            write!(f, "{} [{}] {}", self.path.join("."), self.kind, self.message)
        }
    }
}

/// JSON Schema describing the issue list returned by validation.
pub fn issues_json_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(Vec<ValidationIssue>)).unwrap_or(Value::Null)
}
