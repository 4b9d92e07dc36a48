use serde_json::Value;

use super::{Rule, RowInput, RuleContext};
use crate::logic;
use crate::sandbox::ScriptValue;
use crate::spec::Component;

/// `validate.json`: a JSON-logic rule over `{data, row}` that must yield
/// `true`. Any other result is used as the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRule;

impl Rule for JsonRule {
    fn name(&self) -> &str {
        "json"
    }

    fn applies(&self, component: &Component) -> bool {
        component.validate.json_logic().is_some()
    }

    fn check(&self, cx: &RuleContext<'_>, row: &RowInput<'_>) -> Result<(), String> {
        let Some(rule) = cx.component.validate.json_logic() else {
            return Ok(());
        };
        match logic::apply(rule, &logic::rule_scope(cx.data, row.row)) {
            Ok(Value::Bool(true)) => Ok(()),
            Ok(other) => Err(ScriptValue::from(&other).to_js_string()),
            Err(err) => Err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BaseType, RuleServices};
    use crate::spec::ComponentTree;
    use serde_json::json;

    fn check(rule: Value, row: Value) -> Result<(), String> {
        let components: Vec<Component> = serde_json::from_value(json!([
            { "type": "number", "key": "n", "input": true, "validate": { "json": rule } }
        ]))
        .expect("component");
        let tree = ComponentTree::build(&components);
        let services = RuleServices::default();
        let cx = RuleContext {
            tree: &tree,
            node: 0,
            component: tree.component(0),
            base: BaseType::Number,
            data: &row,
            services: &services,
        };
        let input = row.get("n");
        JsonRule.check(&cx, &RowInput { row: &row, input, path: vec!["n".into()] })
    }

    #[test]
    fn true_passes_anything_else_is_the_message() {
        let rule = json!({ "if": [{ "<": [{ "var": "row.n" }, 10] }, true, "Must be under 10"] });
        assert_eq!(check(rule.clone(), json!({ "n": 3 })), Ok(()));
        assert_eq!(check(rule, json!({ "n": 30 })), Err("Must be under 10".into()));
        assert_eq!(check(json!({ "==": [1, 2] }), json!({})), Err("false".into()));
    }

    #[test]
    fn evaluation_errors_fail_closed() {
        assert_eq!(
            check(json!({ "frobnicate": [] }), json!({})),
            Err("Unrecognized operation frobnicate".into())
        );
    }
}
