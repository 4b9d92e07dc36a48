//! JSON-logic evaluation for `conditional.json` and `validate.json`.
//!
//! A rule is either a literal, an array of rules, or a single-key object
//! `{ "<op>": args }`. Comparisons and arithmetic reuse the sandbox's
//! JavaScript coercions so both rule flavours agree on what `"1" == 1` means.

use std::cmp::Ordering;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::JsonLogicError;
use crate::path;
use crate::sandbox::{ScriptValue, number_value};

type LogicResult = Result<Value, JsonLogicError>;

/// JSON-logic truthiness: like JavaScript, except that `[]` is false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Evaluates `logic` against `data`.
pub fn apply(logic: &Value, data: &Value) -> LogicResult {
    match logic {
        Value::Array(items) => items
            .iter()
            .map(|item| apply(item, data))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) if map.len() == 1 => {
            let Some((op, args)) = map.iter().next() else {
                return Ok(logic.clone());
            };
            operation(op, args, data)
        }
        other => Ok(other.clone()),
    }
}

fn arguments(args: &Value) -> Vec<&Value> {
    match args {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

fn operation(op: &str, raw: &Value, data: &Value) -> LogicResult {
    let args = arguments(raw);

    // Operators that control their own evaluation order.
    match op {
        "if" | "?:" => return conditional(&args, data),
        "and" => return short_circuit(&args, data, false),
        "or" => return short_circuit(&args, data, true),
        "map" | "filter" | "all" | "none" | "some" => return iterate(op, &args, data),
        "reduce" => return reduce(&args, data),
        _ => {}
    }

    let values = args
        .iter()
        .map(|arg| apply(arg, data))
        .collect::<Result<Vec<_>, _>>()?;
    let arg = |index: usize| values.get(index).cloned().unwrap_or(Value::Null);
    let script = |index: usize| ScriptValue::from(&arg(index));

    let result = match op {
        "var" => variable(&values, data),
        "missing" => Value::Array(missing(&values, data)),
        "missing_some" => missing_some(&values, data)?,
        "==" => Value::Bool(script(0).loose_eq(&script(1))),
        "===" => Value::Bool(script(0).strict_eq(&script(1))),
        "!=" => Value::Bool(!script(0).loose_eq(&script(1))),
        "!==" => Value::Bool(!script(0).strict_eq(&script(1))),
        "!" => Value::Bool(!truthy(&arg(0))),
        "!!" => Value::Bool(truthy(&arg(0))),
        "<" | "<=" | ">" | ">=" => Value::Bool(compare_chain(op, &values)),
        "max" | "min" => extreme(op, &values),
        "+" => number_value(values.iter().map(|v| ScriptValue::from(v).to_number()).sum()),
        "*" => number_value(
            values
                .iter()
                .map(|v| ScriptValue::from(v).to_number())
                .product(),
        ),
        "-" if values.len() == 1 => number_value(-script(0).to_number()),
        "-" => number_value(script(0).to_number() - script(1).to_number()),
        "/" => number_value(script(0).to_number() / script(1).to_number()),
        "%" => number_value(script(0).to_number() % script(1).to_number()),
        "merge" => Value::Array(
            values
                .iter()
                .flat_map(|value| match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                })
                .collect(),
        ),
        "in" => {
            let needle = script(0);
            Value::Bool(match arg(1) {
                Value::String(haystack) => haystack.contains(&needle.to_js_string()),
                Value::Array(items) => items
                    .iter()
                    .any(|item| ScriptValue::from(item).strict_eq(&needle)),
                _ => false,
            })
        }
        "cat" => Value::String(
            values
                .iter()
                .map(|value| ScriptValue::from(value).to_js_string())
                .collect(),
        ),
        "substr" => substr(&values),
        "log" => {
            debug!(value = %arg(0), "json-logic log");
            arg(0)
        }
        unknown => return Err(JsonLogicError::UnknownOperator(unknown.to_string())),
    };
    Ok(result)
}

fn conditional(args: &[&Value], data: &Value) -> LogicResult {
    for pair in args.chunks(2) {
        match pair {
            [test, consequent] => {
                if truthy(&apply(test, data)?) {
                    return apply(consequent, data);
                }
            }
            [otherwise] => return apply(otherwise, data),
            _ => {}
        }
    }
    Ok(Value::Null)
}

/// `and` stops at the first falsy value, `or` at the first truthy one.
fn short_circuit(args: &[&Value], data: &Value, stop_when: bool) -> LogicResult {
    let mut last = Value::Null;
    for arg in args {
        last = apply(arg, data)?;
        if truthy(&last) == stop_when {
            break;
        }
    }
    Ok(last)
}

fn iterate(op: &str, args: &[&Value], data: &Value) -> LogicResult {
    let items = match args.first() {
        Some(source) => match apply(source, data)? {
            Value::Array(items) => items,
            _ => Vec::new(),
        },
        None => Vec::new(),
    };
    let logic = args.get(1).copied().unwrap_or(&Value::Null);

    match op {
        "map" => items
            .iter()
            .map(|item| apply(logic, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        "filter" => {
            let mut kept = Vec::new();
            for item in items {
                if truthy(&apply(logic, &item)?) {
                    kept.push(item);
                }
            }
            Ok(Value::Array(kept))
        }
        "all" => {
            if items.is_empty() {
                return Ok(Value::Bool(false));
            }
            for item in &items {
                if !truthy(&apply(logic, item)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        // `none` and `some` differ only in the answer when a match is found.
        _ => {
            let found = op == "some";
            for item in &items {
                if truthy(&apply(logic, item)?) {
                    return Ok(Value::Bool(found));
                }
            }
            Ok(Value::Bool(!found))
        }
    }
}

fn reduce(args: &[&Value], data: &Value) -> LogicResult {
    let items = match args.first() {
        Some(source) => match apply(source, data)? {
            Value::Array(items) => items,
            _ => Vec::new(),
        },
        None => Vec::new(),
    };
    let logic = args.get(1).copied().unwrap_or(&Value::Null);
    let mut accumulator = match args.get(2) {
        Some(initial) => apply(initial, data)?,
        None => Value::Null,
    };
    for current in items {
        accumulator = apply(logic, &json!({ "current": current, "accumulator": accumulator }))?;
    }
    Ok(accumulator)
}

fn variable(values: &[Value], data: &Value) -> Value {
    let key = match values.first() {
        None | Some(Value::Null) => return data.clone(),
        Some(Value::String(key)) if key.is_empty() => return data.clone(),
        Some(Value::String(key)) => key.clone(),
        Some(other) => ScriptValue::from(other).to_js_string(),
    };
    match path::value_at(data, &key) {
        Some(found) => found.clone(),
        None => values.get(1).cloned().unwrap_or(Value::Null),
    }
}

fn missing(values: &[Value], data: &Value) -> Vec<Value> {
    let keys: Vec<&Value> = match values.first() {
        Some(Value::Array(keys)) => keys.iter().collect(),
        _ => values.iter().collect(),
    };
    keys.into_iter()
        .filter(|key| {
            let key = ScriptValue::from(*key).to_js_string();
            match path::value_at(data, &key) {
                None | Some(Value::Null) => true,
                Some(Value::String(text)) => text.is_empty(),
                Some(_) => false,
            }
        })
        .cloned()
        .collect()
}

fn missing_some(values: &[Value], data: &Value) -> LogicResult {
    let need = values
        .first()
        .and_then(Value::as_f64)
        .ok_or_else(|| JsonLogicError::InvalidArguments {
            op: "missing_some".to_string(),
            reason: "first argument must be a number".to_string(),
        })?;
    let keys = match values.get(1) {
        Some(Value::Array(keys)) => keys.clone(),
        _ => Vec::new(),
    };
    let absent = missing(&[Value::Array(keys.clone())], data);
    let present = keys.len().saturating_sub(absent.len());
    if present as f64 >= need {
        Ok(Value::Array(Vec::new()))
    } else {
        Ok(Value::Array(absent))
    }
}

/// `<` and `<=` take an optional third operand for "between" checks.
fn compare_chain(op: &str, values: &[Value]) -> bool {
    let operands: Vec<ScriptValue> = values.iter().map(ScriptValue::from).collect();
    let holds = |a: &ScriptValue, b: &ScriptValue| match (op, a.compare(b)) {
        (_, None) => false,
        ("<", Some(ordering)) => ordering == Ordering::Less,
        ("<=", Some(ordering)) => ordering != Ordering::Greater,
        (">", Some(ordering)) => ordering == Ordering::Greater,
        (_, Some(ordering)) => ordering != Ordering::Less,
    };
    match operands.as_slice() {
        [a, b, c] if op == "<" || op == "<=" => holds(a, b) && holds(b, c),
        [a, b, ..] => holds(a, b),
        [a] => holds(a, &ScriptValue::Undefined),
        [] => false,
    }
}

fn extreme(op: &str, values: &[Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    let numbers = values.iter().map(|value| ScriptValue::from(value).to_number());
    let picked = if op == "max" {
        numbers.fold(f64::NEG_INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) })
    } else {
        numbers.fold(f64::INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) })
    };
    number_value(picked)
}

fn substr(values: &[Value]) -> Value {
    let text: Vec<char> = values
        .first()
        .map(|value| ScriptValue::from(value).to_js_string())
        .unwrap_or_default()
        .chars()
        .collect();
    let len = text.len() as i64;
    let offset = |value: Option<&Value>| value.map(|v| ScriptValue::from(v).to_number().trunc() as i64);

    let start = match offset(values.get(1)).unwrap_or(0) {
        negative if negative < 0 => len.saturating_add(negative).max(0),
        positive => positive.min(len),
    };
    let end = match offset(values.get(2)) {
        None => len,
        Some(negative) if negative < 0 => len.saturating_add(negative).max(start),
        Some(count) => start.saturating_add(count).min(len),
    };
    Value::String(text[start as usize..end.max(start) as usize].iter().collect())
}

/// `{data, row}` scope handed to conditional and validation rules.
pub fn rule_scope(data: &Value, row: &Value) -> Value {
    let mut scope = Map::new();
    scope.insert("data".to_string(), data.clone());
    scope.insert("row".to_string(), row.clone());
    Value::Object(scope)
}
