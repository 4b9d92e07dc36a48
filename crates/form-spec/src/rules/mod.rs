//! Type-scoped validation rules that extend the base field checks.

mod custom;
mod hidden;
mod json;
mod words;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::sandbox::Sandbox;
use crate::spec::{Component, ComponentTree, NodeId};
use crate::template::{Interpolator, MessageCatalog};
use crate::visibility::VisibilityResolver;

pub use custom::CustomRule;
pub use hidden::HiddenRule;
pub use json::JsonRule;
pub use words::{MaxWordsRule, MinWordsRule};

/// Primitive value family a component's data belongs to. Issue types are
/// prefixed with it, e.g. `string.custom`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    Any,
    String,
    Array,
    Object,
    Number,
    Boolean,
    Date,
}

impl BaseType {
    pub const ALL: [BaseType; 7] = [
        BaseType::Any,
        BaseType::String,
        BaseType::Array,
        BaseType::Object,
        BaseType::Number,
        BaseType::Boolean,
        BaseType::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::Any => "any",
            BaseType::String => "string",
            BaseType::Array => "array",
            BaseType::Object => "object",
            BaseType::Number => "number",
            BaseType::Boolean => "boolean",
            BaseType::Date => "date",
        }
    }

    /// Family of a single value of `component` (per item when `multiple`).
    pub fn for_component(component: &Component) -> Self {
        match component.kind.as_str() {
            "textarea" if component.extra.get("as").and_then(Value::as_str) == Some("json") => {
                BaseType::Object
            }
            "textfield" | "textarea" | "password" | "email" | "phoneNumber" | "url"
            | "signature" => BaseType::String,
            "number" | "currency" => BaseType::Number,
            "checkbox" => BaseType::Boolean,
            "datetime" => BaseType::Date,
            "datagrid" | "editgrid" | "file" => BaseType::Array,
            "container" | "address" | "selectboxes" | "form" => BaseType::Object,
            _ => BaseType::Any,
        }
    }

    /// Issue type for `rule` in this family.
    pub fn issue_type(&self, rule: &str) -> String {
        format!("{}.{}", self.as_str(), rule)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the orchestrator drives a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Checked row by row; the first failing row yields the rule's issue.
    Check,
    /// Consulted only when a component already has issues; may replace them.
    Override,
}

/// One value of a component within one data row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowInput<'v> {
    /// Object holding the component's value (the submission data at top level).
    pub row: &'v Value,
    /// The component's value; `None` when the row has no entry for its key.
    pub input: Option<&'v Value>,
    /// Issue path of this value, e.g. `["grid", "0", "name"]`.
    pub path: Vec<String>,
}

/// Shared, immutable collaborators handed to every rule.
#[derive(Debug, Clone)]
pub struct RuleServices {
    pub sandbox: Sandbox,
    pub resolver: VisibilityResolver,
    pub interpolator: Interpolator,
    pub messages: MessageCatalog,
    pub custom_timeout: Duration,
}

impl Default for RuleServices {
    fn default() -> Self {
        Self {
            sandbox: Sandbox::default(),
            resolver: VisibilityResolver::default(),
            interpolator: Interpolator::new(),
            messages: MessageCatalog::standard(),
            custom_timeout: EngineConfig::default().custom_timeout(),
        }
    }
}

impl RuleServices {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            sandbox: Sandbox::new(config.max_script_depth),
            resolver: VisibilityResolver::from_config(config),
            interpolator: Interpolator::new(),
            messages: MessageCatalog::with_overrides(&config.messages)?,
            custom_timeout: config.custom_timeout(),
        })
    }
}

/// Everything a rule may look at while checking one component.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub tree: &'a ComponentTree<'a>,
    pub node: NodeId,
    pub component: &'a Component,
    pub base: BaseType,
    /// Whole submission data.
    pub data: &'a Value,
    pub services: &'a RuleServices,
}

impl<'a> RuleContext<'a> {
    /// Issue message for `rule`. The component's `customMessage` wins over
    /// the catalog; `field` is always available to templates.
    pub fn message(&self, rule: &str, params: Value) -> String {
        let mut params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params
            .entry("field")
            .or_insert_with(|| Value::String(self.component.display_name().to_string()));
        let params = Value::Object(params);
        match self.component.validate.custom_message() {
            Some(custom) => self.services.messages.render_custom(custom, &params),
            None => self.services.messages.render(rule, &params),
        }
    }
}

/// A named validation extension.
pub trait Rule: Send + Sync {
    /// Rule name; also the suffix of the issue type.
    fn name(&self) -> &str;

    fn kind(&self) -> RuleKind {
        RuleKind::Check
    }

    /// Whether `component` declares this rule's parameter.
    fn applies(&self, component: &Component) -> bool;

    /// Checks one row. `Err` carries the issue message. Only called for
    /// [`RuleKind::Check`] rules.
    fn check(&self, cx: &RuleContext<'_>, row: &RowInput<'_>) -> Result<(), String>;

    /// For [`RuleKind::Override`] rules: the message of the single issue that
    /// replaces everything pending on the component, if it should.
    fn override_pending(&self, _cx: &RuleContext<'_>, _row: &RowInput<'_>) -> Option<String> {
        None
    }
}

impl fmt::Debug for dyn Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Ordered rules per value family.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<BaseType, Vec<Arc<dyn Rule>>>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `custom`, `json` and `hidden` for every family, plus `maxWords` and
    /// `minWords` for strings.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        let custom: Arc<dyn Rule> = Arc::new(CustomRule);
        let json: Arc<dyn Rule> = Arc::new(JsonRule);
        let hidden: Arc<dyn Rule> = Arc::new(HiddenRule);
        for base in BaseType::ALL {
            registry
                .register(base, Arc::clone(&custom))
                .register(base, Arc::clone(&json))
                .register(base, Arc::clone(&hidden));
        }
        registry
            .register(BaseType::String, Arc::new(MaxWordsRule))
            .register(BaseType::String, Arc::new(MinWordsRule));
        registry
    }

    /// Appends `rule` to the family's list. A rule with the same name
    /// replaces the earlier registration in place.
    pub fn register(&mut self, base: BaseType, rule: Arc<dyn Rule>) -> &mut Self {
        let rules = self.rules.entry(base).or_default();
        match rules.iter().position(|existing| existing.name() == rule.name()) {
            Some(index) => rules[index] = rule,
            None => rules.push(rule),
        }
        self
    }

    pub fn rules_for(&self, base: BaseType) -> &[Arc<dyn Rule>] {
        self.rules.get(&base).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn names_for(&self, base: BaseType) -> Vec<&str> {
        self.rules_for(base).iter().map(|rule| rule.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EvenRule;

    impl Rule for EvenRule {
        fn name(&self) -> &str {
            "even"
        }

        fn applies(&self, component: &Component) -> bool {
            component.validate.extra.contains_key("even")
        }

        fn check(&self, _cx: &RuleContext<'_>, row: &RowInput<'_>) -> Result<(), String> {
            match row.input.and_then(Value::as_i64) {
                Some(n) if n % 2 != 0 => Err("must be even".into()),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn standard_registry_layout() {
        let registry = RuleRegistry::standard();
        assert_eq!(
            registry.names_for(BaseType::String),
            vec!["custom", "json", "hidden", "maxWords", "minWords"]
        );
        for base in [BaseType::Any, BaseType::Number, BaseType::Date] {
            assert_eq!(registry.names_for(base), vec!["custom", "json", "hidden"]);
        }
    }

    #[test]
    fn callers_can_extend_a_family() {
        let mut registry = RuleRegistry::standard();
        registry.register(BaseType::Number, Arc::new(EvenRule));
        assert_eq!(registry.names_for(BaseType::Number).last(), Some(&"even"));
        registry.register(BaseType::Number, Arc::new(EvenRule));
        assert_eq!(registry.rules_for(BaseType::Number).len(), 4);
    }

    #[test]
    fn base_type_mapping() {
        let component = |value: Value| -> Component { serde_json::from_value(value).expect("component") };
        assert_eq!(BaseType::for_component(&component(json!({ "type": "email" }))), BaseType::String);
        assert_eq!(
            BaseType::for_component(&component(json!({ "type": "textarea", "as": "json" }))),
            BaseType::Object
        );
        assert_eq!(BaseType::for_component(&component(json!({ "type": "datagrid" }))), BaseType::Array);
        assert_eq!(BaseType::for_component(&component(json!({ "type": "select" }))), BaseType::Any);
        assert_eq!(BaseType::Number.issue_type("custom"), "number.custom");
    }

    #[test]
    fn custom_message_overrides_catalog() {
        let components: Vec<Component> = serde_json::from_value(json!([
            { "type": "textfield", "key": "a", "label": "Alpha", "input": true },
            { "type": "textfield", "key": "b", "input": true, "validate": { "customMessage": "Fix {{field}}" } }
        ]))
        .expect("components");
        let tree = ComponentTree::build(&components);
        let services = RuleServices::default();
        let data = json!({});
        let cx = |node: NodeId| RuleContext {
            tree: &tree,
            node,
            component: tree.component(node),
            base: BaseType::String,
            data: &data,
            services: &services,
        };
        assert_eq!(cx(0).message("required", json!({})), "Alpha is required");
        assert_eq!(cx(1).message("required", json!({})), "Fix b");
    }
}
