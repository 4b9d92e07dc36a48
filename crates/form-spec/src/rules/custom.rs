use serde_json::{Value, json};
use tracing::debug;

use super::{Rule, RowInput, RuleContext};
use crate::sandbox::{Bindings, ScriptValue};
use crate::spec::Component;

/// `validate.custom`: an author script that sets `valid` to `true` or to an
/// error message.
///
/// Script failures count as invalid, with the error text as the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomRule;

impl Rule for CustomRule {
    fn name(&self) -> &str {
        "custom"
    }

    fn applies(&self, component: &Component) -> bool {
        component.validate.custom_script().is_some()
    }

    fn check(&self, cx: &RuleContext<'_>, row: &RowInput<'_>) -> Result<(), String> {
        let Some(template) = cx.component.validate.custom_script() else {
            return Ok(());
        };
        let script = cx.services.interpolator.interpolate(template, cx.data);

        let mut bindings = Bindings::new();
        bindings
            .insert(
                "input",
                row.input.map(ScriptValue::from).unwrap_or_default(),
            )
            .insert_json("data", cx.data)
            .insert_json("row", row.row)
            .insert_json("scope", &json!({ "data": cx.data }))
            .insert_json(
                "component",
                &serde_json::to_value(cx.component).unwrap_or(Value::Null),
            )
            .insert("valid", ScriptValue::Bool(true));

        let valid = match cx
            .services
            .sandbox
            .execute(&script, bindings, cx.services.custom_timeout)
        {
            Ok(scope) => scope.get("valid").cloned().unwrap_or_default(),
            Err(err) => {
                debug!(component = %cx.component, timed_out = err.is_timeout(), error = %err, "custom validation script failed");
                ScriptValue::String(err.to_string())
            }
        };

        match valid {
            ScriptValue::Bool(true) => Ok(()),
            other => Err(other.to_js_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BaseType, RuleServices};
    use crate::spec::ComponentTree;
    use std::time::Duration;

    fn check(component: Value, input: Value, data: Value) -> Result<(), String> {
        let components: Vec<Component> = serde_json::from_value(json!([component])).expect("component");
        let tree = ComponentTree::build(&components);
        let services = RuleServices {
            custom_timeout: Duration::from_millis(20),
            ..RuleServices::default()
        };
        let cx = RuleContext {
            tree: &tree,
            node: 0,
            component: tree.component(0),
            base: BaseType::String,
            data: &data,
            services: &services,
        };
        let row = RowInput {
            row: &data,
            input: Some(&input),
            path: vec!["f".into()],
        };
        CustomRule.check(&cx, &row)
    }

    #[test]
    fn valid_must_be_exactly_true() {
        let component = json!({ "type": "textfield", "key": "f", "validate": { "custom": "valid = input === 'x'" } });
        assert_eq!(check(component.clone(), json!("x"), json!({})), Ok(()));
        assert_eq!(check(component, json!("y"), json!({})), Err("false".into()));

        let component = json!({ "type": "textfield", "key": "f", "validate": { "custom": "valid = input.length > 2 ? true : 'Too short'" } });
        assert_eq!(check(component, json!("ab"), json!({})), Err("Too short".into()));
    }

    #[test]
    fn script_failures_fail_closed() {
        let component = json!({ "type": "textfield", "key": "f", "validate": { "custom": "valid = nope.x" } });
        assert_eq!(
            check(component, json!("a"), json!({})),
            Err("ReferenceError: nope is not defined".into())
        );

        let component = json!({ "type": "textfield", "key": "f", "validate": { "custom": "while (true) {}" } });
        assert_eq!(
            check(component, json!("a"), json!({})),
            Err("Error: Script execution timed out after 20ms".into())
        );
    }

    #[test]
    fn templates_read_submission_data() {
        let component = json!({ "type": "number", "key": "f", "validate": { "custom": "valid = input <= {{ limit }} || 'over'" } });
        assert_eq!(check(component.clone(), json!(3), json!({ "limit": 5 })), Ok(()));
        assert_eq!(check(component, json!(9), json!({ "limit": 5 })), Err("over".into()));
    }

    #[test]
    fn component_and_scope_are_bound() {
        let component = json!({ "type": "textfield", "key": "f", "validate": {
            "custom": "valid = component.key === 'f' && scope.data.other === row.other"
        }});
        assert_eq!(check(component, json!(""), json!({ "other": 1 })), Ok(()));
    }
}
