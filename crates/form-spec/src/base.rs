//! Conventional field checks: required, value type, length, pattern, range
//! and email format. Registry rules run after these.

use regex::Regex;
use serde_json::{Value, json};
use tracing::warn;

use crate::issue::ValidationIssue;
use crate::rules::{BaseType, RowInput, RuleContext};
use crate::sandbox::number_value;
use crate::spec::Component;

/// Failed check: rule name plus message parameters.
type Failure = (&'static str, Value);

#[derive(Debug, Clone)]
pub struct BaseValidator {
    email: Regex,
}

impl Default for BaseValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseValidator {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"),
        }
    }

    /// Issues for one row of `cx.component`. Empty values only fail
    /// `required`; every other check needs something to look at.
    pub fn check(&self, cx: &RuleContext<'_>, row: &RowInput<'_>) -> Vec<ValidationIssue> {
        let component = cx.component;
        let issue = |(rule, params): Failure| {
            let kind = if rule == "required" {
                BaseType::Any.issue_type(rule)
            } else {
                cx.base.issue_type(rule)
            };
            ValidationIssue::new(kind, cx.message(rule, params), row.path.clone())
        };

        let Some(value) = row.input.filter(|value| !is_empty(component, value)) else {
            if component.validate.required {
                return vec![issue(("required", json!({})))];
            }
            return Vec::new();
        };

        let values: Vec<&Value> = match value {
            Value::Array(items) if component.multiple => items.iter().collect(),
            single => vec![single],
        };

        let mut failures: Vec<Failure> = Vec::new();
        for value in values {
            if is_empty(component, value) {
                continue;
            }
            for failure in self.check_value(component, cx.base, value) {
                if !failures.iter().any(|(rule, _)| *rule == failure.0) {
                    failures.push(failure);
                }
            }
        }
        failures.into_iter().map(issue).collect()
    }

    fn check_value(&self, component: &Component, base: BaseType, value: &Value) -> Vec<Failure> {
        if !matches_type(base, value) {
            return vec![("base", json!({ "type": base.as_str() }))];
        }

        let mut failures = Vec::new();
        let validate = &component.validate;

        if let Some(text) = value.as_str() {
            let length = text.chars().count();
            if let Some(min) = validate.min_length()
                && length < min
            {
                failures.push(("minLength", json!({ "length": min })));
            }
            if let Some(max) = validate.max_length()
                && length > max
            {
                failures.push(("maxLength", json!({ "length": max })));
            }
            if let Some(pattern) = validate.pattern() {
                match Regex::new(&format!("^(?:{})$", pattern)) {
                    Ok(regex) if !regex.is_match(text) => {
                        failures.push(("pattern", json!({ "pattern": pattern })));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(component = %component, error = %err, "ignoring invalid validate.pattern");
                    }
                }
            }
            if component.kind == "email" && !self.email.is_match(text) {
                failures.push(("email", json!({})));
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = validate.min()
                && number < min
            {
                failures.push(("min", json!({ "min": number_value(min) })));
            }
            if let Some(max) = validate.max()
                && number > max
            {
                failures.push(("max", json!({ "max": number_value(max) })));
            }
        }

        failures
    }
}

fn matches_type(base: BaseType, value: &Value) -> bool {
    match base {
        BaseType::Any => true,
        BaseType::String => value.is_string(),
        BaseType::Number => value.is_number(),
        BaseType::Boolean => value.is_boolean(),
        BaseType::Array => value.is_array(),
        BaseType::Object => value.is_object(),
        BaseType::Date => value.is_string() || value.is_number(),
    }
}

/// Values that do not satisfy `required`.
fn is_empty(component: &Component, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) if component.kind == "selectboxes" => {
            !map.values().any(|flag| flag.as_bool() == Some(true))
        }
        Value::Object(map) => map.is_empty(),
        Value::Bool(flag) => component.kind == "checkbox" && !flag,
        Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleServices;
    use crate::spec::ComponentTree;

    fn check(component: Value, input: Option<Value>) -> Vec<ValidationIssue> {
        let components: Vec<Component> = serde_json::from_value(json!([component])).expect("component");
        let tree = ComponentTree::build(&components);
        let services = RuleServices::default();
        let data = json!({});
        let component = tree.component(0);
        let cx = RuleContext {
            tree: &tree,
            node: 0,
            component,
            base: BaseType::for_component(component),
            data: &data,
            services: &services,
        };
        let row = RowInput {
            row: &data,
            input: input.as_ref(),
            path: vec![component.data_key().unwrap_or_default().to_string()],
        };
        BaseValidator::new().check(&cx, &row)
    }

    fn kinds(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|issue| issue.kind.as_str()).collect()
    }

    #[test]
    fn required_uses_any_family() {
        let field = json!({ "type": "textfield", "key": "name", "label": "Name", "validate": { "required": true } });
        let issues = check(field.clone(), None);
        assert_eq!(kinds(&issues), vec!["any.required"]);
        assert_eq!(issues[0].message, "Name is required");
        assert_eq!(issues[0].path, vec!["name"]);
        assert_eq!(kinds(&check(field.clone(), Some(json!("")))), vec!["any.required"]);
        assert!(check(field, Some(json!("Ada"))).is_empty());

        let checkbox = json!({ "type": "checkbox", "key": "terms", "validate": { "required": true } });
        assert_eq!(kinds(&check(checkbox, Some(json!(false)))), vec!["any.required"]);
    }

    #[test]
    fn optional_empty_values_skip_other_checks() {
        let field = json!({ "type": "textfield", "key": "code", "validate": { "minLength": 3 } });
        assert!(check(field, Some(json!(""))).is_empty());
    }

    #[test]
    fn type_mismatch_short_circuits_the_value() {
        let field = json!({ "type": "number", "key": "age", "label": "Age", "validate": { "min": 18 } });
        let issues = check(field, Some(json!("old")));
        assert_eq!(kinds(&issues), vec!["number.base"]);
        assert_eq!(issues[0].message, "Age must be a number");
    }

    #[test]
    fn length_pattern_and_email() {
        let field = json!({ "type": "textfield", "key": "zip", "label": "Zip",
            "validate": { "minLength": 5, "pattern": "[0-9]+" } });
        let issues = check(field, Some(json!("12a")));
        assert_eq!(kinds(&issues), vec!["string.minLength", "string.pattern"]);
        assert_eq!(issues[0].message, "Zip must have at least 5 characters.");
        assert_eq!(issues[1].message, "Zip does not match the pattern [0-9]+");

        let email = json!({ "type": "email", "key": "email", "label": "Email" });
        assert_eq!(kinds(&check(email.clone(), Some(json!("nope")))), vec!["string.email"]);
        assert!(check(email, Some(json!("a@b.io"))).is_empty());
    }

    #[test]
    fn numeric_range() {
        let field = json!({ "type": "number", "key": "qty", "label": "Qty", "validate": { "min": 1, "max": 10 } });
        let issues = check(field.clone(), Some(json!(11)));
        assert_eq!(kinds(&issues), vec!["number.max"]);
        assert_eq!(issues[0].message, "Qty cannot be greater than 10.");
        assert!(check(field, Some(json!(5))).is_empty());
    }

    #[test]
    fn multiple_values_are_checked_per_item_once_per_rule() {
        let field = json!({ "type": "textfield", "key": "tags", "multiple": true, "validate": { "maxLength": 3 } });
        let issues = check(field, Some(json!(["ok", "toolong", "waytoolong"])));
        assert_eq!(kinds(&issues), vec!["string.maxLength"]);
    }
}
