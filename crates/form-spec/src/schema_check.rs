//! Static shape of a form definition: top-level fields and component key
//! uniqueness. Works on the raw document so that malformed schemas are
//! reported rather than rejected at deserialization.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::issue::ValidationIssue;
use crate::spec::{ComponentTree, Display, parse_components};

pub const UNIQUE_KEYS_ISSUE: &str = "unique component keys";

/// Every structural issue found in a schema, in field order followed by the
/// duplicate-key issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaCheck {
    pub issues: Vec<ValidationIssue>,
}

impl SchemaCheck {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn validate_schema(schema: &Value) -> SchemaCheck {
    let mut issues = Vec::new();
    if !schema.is_object() {
        issues.push(field_issue("object.base", "value", "must be of type object", &[]));
        return SchemaCheck { issues };
    }

    for field in ["name", "title", "path"] {
        check_required_text(schema, field, &mut issues);
    }
    check_tags(schema.get("tags"), &mut issues);
    check_display(schema.get("display"), &mut issues);
    for field in ["access", "submissionAccess"] {
        if let Some(value) = present(schema.get(field))
            && !value.is_array()
        {
            issues.push(field_issue("array.base", field, "must be an array", &[field]));
        }
    }

    let components = present(schema.get("components"));
    if let Some(value) = components
        && !value.is_array()
    {
        issues.push(field_issue("array.base", "components", "must be an array", &["components"]));
    }
    let parsed = parse_components(components);
    for (index, reason) in &parsed.rejected {
        let label = format!("components[{}]", index);
        let position = index.to_string();
        let issue = match components.and_then(|value| value.get(*index)) {
            Some(item) if !item.is_object() => {
                field_issue("object.base", &label, "must be of type object", &["components", &position])
            }
            _ => field_issue(
                "object.base",
                &label,
                &format!("is not a valid component: {}", reason),
                &["components", &position],
            ),
        };
        issues.push(issue);
    }

    let tree = ComponentTree::build(&parsed.components);
    let duplicates = duplicate_paths(&tree.input_paths());
    if !duplicates.is_empty() {
        debug!(?duplicates, "duplicate component keys");
        issues.push(ValidationIssue::new(
            UNIQUE_KEYS_ISSUE,
            format!("Component keys must be unique: {}", duplicates.join(", ")),
            duplicates,
        ));
    }

    SchemaCheck { issues }
}

/// Paths that occur more than once, each listed once, in order of first repeat.
fn duplicate_paths(paths: &[&str]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for path in paths {
        if !seen.insert(*path) && !duplicates.iter().any(|dup| dup.as_str() == *path) {
            duplicates.push((*path).to_string());
        }
    }
    duplicates
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| !value.is_null())
}

fn check_required_text(schema: &Value, field: &str, issues: &mut Vec<ValidationIssue>) {
    match present(schema.get(field)) {
        None => issues.push(field_issue("any.required", field, "is required", &[field])),
        Some(Value::String(text)) if text.is_empty() => {
            issues.push(field_issue("string.empty", field, "is not allowed to be empty", &[field]))
        }
        Some(Value::String(_)) => {}
        Some(_) => issues.push(field_issue("string.base", field, "must be a string", &[field])),
    }
}

fn check_tags(tags: Option<&Value>, issues: &mut Vec<ValidationIssue>) {
    match present(tags) {
        None => {}
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                if !item.is_string() {
                    let position = index.to_string();
                    issues.push(field_issue(
                        "string.base",
                        &format!("tags[{}]", index),
                        "must be a string",
                        &["tags", &position],
                    ));
                }
            }
        }
        Some(_) => issues.push(field_issue("array.base", "tags", "must be an array", &["tags"])),
    }
}

fn check_display(display: Option<&Value>, issues: &mut Vec<ValidationIssue>) {
    match present(display) {
        None => {}
        Some(Value::String(text)) if text.parse::<Display>().is_ok() => {}
        Some(Value::String(_)) => {
            let allowed: Vec<&str> = Display::ALL.iter().map(Display::as_str).collect();
            issues.push(field_issue(
                "any.only",
                "display",
                &format!("must be one of [{}]", allowed.join(", ")),
                &["display"],
            ));
        }
        Some(_) => issues.push(field_issue("string.base", "display", "must be a string", &["display"])),
    }
}

fn field_issue(kind: &str, label: &str, problem: &str, path: &[&str]) -> ValidationIssue {
    ValidationIssue::new(
        kind,
        format!("\"{}\" {}", label, problem),
        path.iter().map(|segment| segment.to_string()).collect(),
    )
}
