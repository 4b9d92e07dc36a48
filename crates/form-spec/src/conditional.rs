//! Declarative conditionals: `conditional.json` (JSON-logic) and the simple
//! `{show, when, eq}` triple.

use serde_json::Value;

use crate::error::JsonLogicError;
use crate::logic;
use crate::path;
use crate::sandbox::ScriptValue;
use crate::spec::Conditional;

/// Visibility decided by `conditional`, or `None` when it expresses no
/// condition at all.
pub fn evaluate(
    conditional: &Conditional,
    row: &Value,
    data: &Value,
) -> Result<Option<bool>, JsonLogicError> {
    if let Some(rule) = conditional.json_logic() {
        let result = logic::apply(rule, &logic::rule_scope(data, row))?;
        return Ok(Some(logic::truthy(&result)));
    }
    Ok(check_simple(conditional, row, data))
}

/// `{show, when, eq}`: show (or hide) the component when the value of the
/// component keyed `when` equals `eq`.
///
/// The value is read from the current row first, then searched for anywhere
/// in the submission data. Checkbox groups (objects of flags) compare the
/// flag named `eq`; multi-value fields match when they contain `eq`.
pub fn check_simple(conditional: &Conditional, row: &Value, data: &Value) -> Option<bool> {
    let when = conditional.when_key()?;
    let show = conditional
        .show
        .as_ref()
        .map(|show| ScriptValue::from(show).to_js_string())
        .unwrap_or_default();
    let eq = conditional
        .eq
        .as_ref()
        .map(|eq| ScriptValue::from(eq).to_js_string())
        .unwrap_or_default();

    let value = path::value_at(row, when)
        .filter(|value| !value.is_null())
        .or_else(|| path::find_key(data, when))
        .filter(|value| !is_blank(value));
    let Some(value) = value else {
        return Some(eq.is_empty() == (show == "true"));
    };

    match value {
        Value::Object(map) if map.contains_key(&eq) => {
            let flag = map
                .get(&eq)
                .map(|flag| ScriptValue::from(flag).to_js_string())
                .unwrap_or_default();
            Some(flag == show)
        }
        Value::Array(items) if items.iter().any(|item| ScriptValue::from(item).to_js_string() == eq) => {
            Some(show == "true")
        }
        other => Some((ScriptValue::from(other).to_js_string() == eq) == (show == "true")),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditional(value: Value) -> Conditional {
        serde_json::from_value(value).expect("conditional")
    }

    #[test]
    fn simple_equality_shows_and_hides() {
        let show_when_yes = conditional(json!({ "show": true, "when": "answer", "eq": "yes" }));
        let data = json!({ "answer": "yes" });
        assert_eq!(check_simple(&show_when_yes, &data, &data), Some(true));
        let data = json!({ "answer": "no" });
        assert_eq!(check_simple(&show_when_yes, &data, &data), Some(false));

        let hide_when_yes = conditional(json!({ "show": "false", "when": "answer", "eq": "yes" }));
        let data = json!({ "answer": "yes" });
        assert_eq!(check_simple(&hide_when_yes, &data, &data), Some(false));
    }

    #[test]
    fn row_value_wins_over_data_search() {
        let cond = conditional(json!({ "show": true, "when": "kind", "eq": "pet" }));
        let data = json!({ "kind": "person", "grid": [{ "kind": "pet" }] });
        let row = json!({ "kind": "pet" });
        assert_eq!(check_simple(&cond, &row, &data), Some(true));
        assert_eq!(check_simple(&cond, &json!({}), &data), Some(false));
    }

    #[test]
    fn checkbox_groups_and_multi_values() {
        let cond = conditional(json!({ "show": true, "when": "colors", "eq": "red" }));
        let data = json!({ "colors": { "red": true, "blue": false } });
        assert_eq!(check_simple(&cond, &data, &data), Some(true));
        let data = json!({ "colors": { "red": false } });
        assert_eq!(check_simple(&cond, &data, &data), Some(false));
        let data = json!({ "colors": ["blue", "red"] });
        assert_eq!(check_simple(&cond, &data, &data), Some(true));
    }

    #[test]
    fn no_when_means_no_opinion() {
        let cond = conditional(json!({ "show": "", "when": null, "eq": "" }));
        assert_eq!(check_simple(&cond, &json!({}), &json!({})), None);
    }

    #[test]
    fn json_logic_takes_precedence() {
        let cond = conditional(json!({
            "show": true, "when": "a", "eq": "x",
            "json": { "===": [{ "var": "row.a" }, "z"] }
        }));
        assert_eq!(evaluate(&cond, &json!({ "a": "z" }), &json!({})), Ok(Some(true)));
        assert_eq!(evaluate(&cond, &json!({ "a": "x" }), &json!({})), Ok(Some(false)));

        let broken = conditional(json!({ "json": { "bogus": [] } }));
        assert!(evaluate(&broken, &json!({}), &json!({})).is_err());
    }
}
