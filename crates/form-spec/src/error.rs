use std::path::PathBuf;

use thiserror::Error;

use crate::issue::ValidationIssue;

/// Failure of a sandboxed script. Never surfaced past the rule that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("Error: Script execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("{0}")]
    Script(String),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout { .. })
    }
}

/// Failure while applying a JSON-logic rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonLogicError {
    #[error("Unrecognized operation {0}")]
    UnknownOperator(String),
    #[error("invalid arguments for '{op}': {reason}")]
    InvalidArguments { op: String, reason: String },
}

/// Fatal to a whole validation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("\"data\" is required")]
    MissingSubmissionData,
}

impl ValidateError {
    /// The single issue reported in place of a full validation pass.
    pub fn into_issue(self) -> ValidationIssue {
        match self {
            ValidateError::MissingSubmissionData => {
                ValidationIssue::new("required", self.to_string(), vec!["data".to_string()])
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("invalid message template '{name}': {reason}")]
    Template { name: String, reason: String },
}
