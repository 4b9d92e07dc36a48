#![allow(missing_docs)]

pub mod base;
pub mod conditional;
pub mod config;
pub mod error;
pub mod issue;
pub mod logic;
pub mod path;
pub mod rules;
pub mod sandbox;
pub mod schema_check;
pub mod spec;
pub mod template;
pub mod validate;
pub mod visibility;

pub use config::EngineConfig;
pub use error::{ConfigError, JsonLogicError, SandboxError, ValidateError};
pub use issue::{ValidationIssue, issues_json_schema};
pub use rules::{BaseType, Rule, RuleContext, RuleKind, RuleRegistry, RuleServices, RowInput};
pub use sandbox::{Bindings, Sandbox, ScriptValue};
pub use schema_check::{SchemaCheck, validate_schema};
pub use spec::{Component, ComponentTree, FormSchema, Submission, UserContext};
pub use template::{Interpolator, MessageCatalog};
pub use validate::{Validator, validate};
pub use visibility::{VisibilityMap, VisibilityResolver, resolve_visibility};
