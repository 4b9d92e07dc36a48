use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

/// Runtime value inside the sandbox. Mirrors JSON plus `undefined`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Object(BTreeMap<String, ScriptValue>),
}

impl ScriptValue {
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(flag) => *flag,
            ScriptValue::Number(number) => *number != 0.0 && !number.is_nan(),
            ScriptValue::String(text) => !text.is_empty(),
            ScriptValue::Array(_) | ScriptValue::Object(_) => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Null | ScriptValue::Array(_) | ScriptValue::Object(_) => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            ScriptValue::Undefined => f64::NAN,
            ScriptValue::Null => 0.0,
            ScriptValue::Bool(flag) => f64::from(u8::from(*flag)),
            ScriptValue::Number(number) => *number,
            ScriptValue::String(text) => parse_numeric(text),
            ScriptValue::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => parse_numeric(&single.to_js_string()),
                _ => f64::NAN,
            },
            ScriptValue::Object(_) => f64::NAN,
        }
    }

    /// String conversion with JavaScript `String(value)` semantics.
    pub fn to_js_string(&self) -> String {
        match self {
            ScriptValue::Undefined => "undefined".to_string(),
            ScriptValue::Null => "null".to_string(),
            ScriptValue::Bool(flag) => flag.to_string(),
            ScriptValue::Number(number) => format_number(*number),
            ScriptValue::String(text) => text.clone(),
            ScriptValue::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            ScriptValue::Object(_) => "[object Object]".to_string(),
        }
    }

    /// `===`. Arrays and objects compare structurally since the sandbox has
    /// no reference identity.
    pub fn strict_eq(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            _ => self == other,
        }
    }

    /// `==` with JavaScript coercions.
    pub fn loose_eq(&self, other: &ScriptValue) -> bool {
        use ScriptValue::*;
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Number(_), String(_)) | (String(_), Number(_)) => self.to_number() == other.to_number(),
            (Bool(_), _) => Number(self.to_number()).loose_eq(other),
            (_, Bool(_)) => self.loose_eq(&Number(other.to_number())),
            (Array(_) | Object(_), String(_) | Number(_)) => {
                String(self.to_js_string()).loose_eq(other)
            }
            (String(_) | Number(_), Array(_) | Object(_)) => {
                self.loose_eq(&String(other.to_js_string()))
            }
            _ => self.strict_eq(other),
        }
    }

    /// Abstract relational comparison; `None` when either side is NaN.
    pub fn compare(&self, other: &ScriptValue) -> Option<std::cmp::Ordering> {
        if let (ScriptValue::String(a), ScriptValue::String(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        let (a, b) = (self.to_primitive_number(), other.to_primitive_number());
        a.partial_cmp(&b)
    }

    fn to_primitive_number(&self) -> f64 {
        match self {
            ScriptValue::Array(_) | ScriptValue::Object(_) => {
                parse_numeric(&self.to_js_string())
            }
            _ => self.to_number(),
        }
    }

    /// JSON form. `undefined` has none; inside arrays it becomes `null` and
    /// inside objects the entry is dropped, as `JSON.stringify` does.
    pub fn to_json(&self) -> Option<Value> {
        Some(match self {
            ScriptValue::Undefined => return None,
            ScriptValue::Null => Value::Null,
            ScriptValue::Bool(flag) => Value::Bool(*flag),
            ScriptValue::Number(number) => number_value(*number),
            ScriptValue::String(text) => Value::String(text.clone()),
            ScriptValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json().unwrap_or(Value::Null))
                    .collect(),
            ),
            ScriptValue::Object(map) => Value::Object(
                map.iter()
                    .filter_map(|(key, value)| value.to_json().map(|json| (key.clone(), json)))
                    .collect::<Map<_, _>>(),
            ),
        })
    }
}

impl From<&Value> for ScriptValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(flag) => ScriptValue::Bool(*flag),
            Value::Number(number) => ScriptValue::Number(number.as_f64().unwrap_or(f64::NAN)),
            Value::String(text) => ScriptValue::String(text.clone()),
            Value::Array(items) => ScriptValue::Array(items.iter().map(ScriptValue::from).collect()),
            Value::Object(map) => ScriptValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), ScriptValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for ScriptValue {
    fn from(value: Value) -> Self {
        ScriptValue::from(&value)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Number(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

/// JSON number for `number`, preferring an integer representation.
pub fn number_value(number: f64) -> Value {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(number as i64))
    } else {
        Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}

/// Number formatting with JavaScript `String(number)` output for common cases.
pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        if number > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if number == 0.0 {
        "0".to_string()
    } else if number.fract() == 0.0 && number.abs() < 1e21 {
        format!("{:.0}", number)
    } else {
        format!("{}", number)
    }
}

/// `Number(text)`: trims, empty is 0, otherwise the whole string must parse.
pub fn parse_numeric(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coercions_follow_javascript() {
        assert_eq!(ScriptValue::from("  42 ").to_number(), 42.0);
        assert!(ScriptValue::from("4x").to_number().is_nan());
        assert_eq!(ScriptValue::Null.to_number(), 0.0);
        assert_eq!(ScriptValue::Number(3.0).to_js_string(), "3");
        assert_eq!(ScriptValue::Number(0.5).to_js_string(), "0.5");
        assert_eq!(
            ScriptValue::from(json!([1, null, "a"])).to_js_string(),
            "1,,a"
        );
        assert_eq!(ScriptValue::from(json!({})).to_js_string(), "[object Object]");
    }

    #[test]
    fn equality_variants() {
        let one = ScriptValue::Number(1.0);
        assert!(one.loose_eq(&ScriptValue::from("1")));
        assert!(!one.strict_eq(&ScriptValue::from("1")));
        assert!(ScriptValue::Null.loose_eq(&ScriptValue::Undefined));
        assert!(!ScriptValue::Null.strict_eq(&ScriptValue::Undefined));
        assert!(ScriptValue::Bool(true).loose_eq(&one));
        assert!(!ScriptValue::Number(f64::NAN).strict_eq(&ScriptValue::Number(f64::NAN)));
    }

    #[test]
    fn json_round_trip_drops_undefined_members() {
        let mut map = BTreeMap::new();
        map.insert("keep".to_string(), ScriptValue::Number(2.0));
        map.insert("drop".to_string(), ScriptValue::Undefined);
        let value = ScriptValue::Array(vec![ScriptValue::Object(map), ScriptValue::Undefined]);
        assert_eq!(value.to_json(), Some(json!([{ "keep": 2 }, null])));
        assert_eq!(ScriptValue::Undefined.to_json(), None);
    }
}
