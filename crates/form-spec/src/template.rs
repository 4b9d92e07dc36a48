use std::collections::BTreeMap;

use handlebars::{Handlebars, no_escape};
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

use crate::error::ConfigError;
use crate::path;
use crate::sandbox::ScriptValue;

/// Built-in message templates, keyed by rule name.
pub const DEFAULT_MESSAGES: &[(&str, &str)] = &[
    ("required", "{{field}} is required"),
    ("base", "{{field}} must be a {{type}}"),
    ("minLength", "{{field}} must have at least {{length}} characters."),
    ("maxLength", "{{field}} must have no more than {{length}} characters."),
    ("minWords", "{{field}} must have at least {{length}} words."),
    ("maxWords", "{{field}} must have no more than {{length}} words."),
    ("min", "{{field}} cannot be less than {{min}}."),
    ("max", "{{field}} cannot be greater than {{max}}."),
    ("pattern", "{{field}} does not match the pattern {{pattern}}"),
    ("email", "{{field}} must be a valid email."),
    ("hidden", "{{field}} is conditionally hidden"),
];

/// Renders issue messages from named Handlebars templates.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    registry: Handlebars<'static>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl MessageCatalog {
    pub fn standard() -> Self {
        let mut registry = Self::registry();
        for (name, template) in DEFAULT_MESSAGES {
            if let Err(err) = registry.register_template_string(name, *template) {
                warn!(template = name, error = %err, "built-in message template rejected");
            }
        }
        Self { registry }
    }

    /// Built-in templates with `overrides` replacing or adding entries.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut catalog = Self::standard();
        for (name, template) in overrides {
            catalog
                .registry
                .register_template_string(name, template)
                .map_err(|err| ConfigError::Template {
                    name: name.clone(),
                    reason: err.to_string(),
                })?;
        }
        Ok(catalog)
    }

    fn registry() -> Handlebars<'static> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);
        registry
    }

    pub fn has(&self, rule: &str) -> bool {
        self.registry.has_template(rule)
    }

    /// Message for `rule`; the rule name itself if no template is known.
    pub fn render(&self, rule: &str, params: &Value) -> String {
        if !self.has(rule) {
            return rule.to_string();
        }
        self.registry.render(rule, params).unwrap_or_else(|err| {
            warn!(rule, error = %err, "message template failed to render");
            rule.to_string()
        })
    }

    /// Renders an author-supplied `customMessage`; falls back to the raw text.
    pub fn render_custom(&self, template: &str, params: &Value) -> String {
        self.registry
            .render_template(template, params)
            .unwrap_or_else(|_| template.to_string())
    }
}

/// Mustache-style `{{ path }}` substitution into script text.
///
/// Only dotted data paths are understood; there are no helpers or blocks.
#[derive(Debug, Clone)]
pub struct Interpolator {
    token: Regex,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpolator {
    pub fn new() -> Self {
        Self {
            token: Regex::new(r"\{\{\s*(.*?\S)\s*\}\}").expect("interpolation token pattern is valid"),
        }
    }

    /// Returns a new string with each token replaced by `String(value)` of
    /// the value at that path in `data`, or `undefined` when absent.
    pub fn interpolate(&self, text: &str, data: &Value) -> String {
        if !text.contains("{{") {
            return text.to_string();
        }
        self.token
            .replace_all(text, |caps: &Captures<'_>| {
                let expr = caps.get(1).map_or("", |m| m.as_str());
                path::value_at(data, expr)
                    .or_else(|| {
                        expr.strip_prefix("data.")
                            .and_then(|rest| path::value_at(data, rest))
                    })
                    .map(|value| ScriptValue::from(value).to_js_string())
                    .unwrap_or_else(|| "undefined".to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_builtin_and_overridden_messages() {
        let catalog = MessageCatalog::standard();
        assert_eq!(
            catalog.render("maxWords", &json!({ "field": "Bio", "length": 3 })),
            "Bio must have no more than 3 words."
        );
        assert_eq!(catalog.render("unknownRule", &json!({})), "unknownRule");

        let mut overrides = BTreeMap::new();
        overrides.insert("required".to_string(), "Please fill in {{field}}".to_string());
        let catalog = MessageCatalog::with_overrides(&overrides).expect("valid override");
        assert_eq!(
            catalog.render("required", &json!({ "field": "<Name>" })),
            "Please fill in <Name>"
        );
    }

    #[test]
    fn broken_override_is_a_config_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert("required".to_string(), "{{#if}}".to_string());
        let err = MessageCatalog::with_overrides(&overrides).expect_err("invalid");
        assert!(matches!(err, ConfigError::Template { ref name, .. } if name == "required"));
    }

    #[test]
    fn interpolation_reads_data_paths() {
        let interpolator = Interpolator::new();
        let data = json!({ "limit": 5, "user": { "name": "ada" } });
        let script = "valid = input <= {{ limit }} && '{{data.user.name}}' !== '{{ nope }}';";
        assert_eq!(
            interpolator.interpolate(script, &data),
            "valid = input <= 5 && 'ada' !== 'undefined';"
        );
        assert_eq!(interpolator.interpolate(script, &data), interpolator.interpolate(script, &data));
    }
}
