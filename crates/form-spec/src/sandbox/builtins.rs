//! The small standard library visible to scripts: property reads, string
//! and array methods, `Math`, and a handful of global conversion functions.

use std::collections::BTreeMap;

use super::value::ScriptValue;
use crate::error::SandboxError;

type BuiltinResult = Result<ScriptValue, SandboxError>;

/// Longest string, in bytes, a script may build.
pub const MAX_STRING_LEN: usize = 4 * 1024 * 1024;
/// Longest array a script may build.
pub const MAX_ARRAY_LEN: usize = 1 << 20;

const ERROR_CONSTRUCTORS: &[&str] = &[
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
];

pub fn range_error(message: &str) -> SandboxError {
    SandboxError::Script(format!("RangeError: {}", message))
}

/// `value`, unless it is a string or array past the size limits.
pub fn bounded(value: ScriptValue) -> BuiltinResult {
    match &value {
        ScriptValue::String(text) if text.len() > MAX_STRING_LEN => {
            Err(range_error("Invalid string length"))
        }
        ScriptValue::Array(items) if items.len() > MAX_ARRAY_LEN => {
            Err(range_error("Invalid array length"))
        }
        _ => Ok(value),
    }
}

pub fn array_index(key: &ScriptValue) -> Option<usize> {
    match key {
        ScriptValue::Number(number) if *number >= 0.0 && number.fract() == 0.0 => {
            Some(*number as usize)
        }
        ScriptValue::String(text) => text.parse().ok(),
        _ => None,
    }
}

pub fn get_property(target: &ScriptValue, key: &ScriptValue) -> BuiltinResult {
    let name = key.to_js_string();
    match target {
        ScriptValue::Undefined | ScriptValue::Null => Err(SandboxError::Script(format!(
            "TypeError: Cannot read properties of {} (reading '{}')",
            target.to_js_string(),
            name
        ))),
        ScriptValue::String(text) => {
            if name == "length" {
                return Ok(ScriptValue::Number(text.chars().count() as f64));
            }
            Ok(array_index(key)
                .and_then(|index| text.chars().nth(index))
                .map_or(ScriptValue::Undefined, |c| ScriptValue::String(c.to_string())))
        }
        ScriptValue::Array(items) => {
            if name == "length" {
                return Ok(ScriptValue::Number(items.len() as f64));
            }
            Ok(array_index(key)
                .and_then(|index| items.get(index))
                .cloned()
                .unwrap_or_default())
        }
        ScriptValue::Object(map) => Ok(map.get(&name).cloned().unwrap_or_default()),
        _ => Ok(ScriptValue::Undefined),
    }
}

/// `new Error(message)` and friends. Nothing else is constructible.
pub fn construct(constructor: &str, args: &[ScriptValue]) -> BuiltinResult {
    if !ERROR_CONSTRUCTORS.contains(&constructor) {
        return Err(SandboxError::Script(format!(
            "TypeError: {} is not a constructor",
            constructor
        )));
    }
    let message = match args.first() {
        None | Some(ScriptValue::Undefined) => String::new(),
        Some(value) => value.to_js_string(),
    };
    let mut error = BTreeMap::new();
    error.insert("name".to_string(), ScriptValue::from(constructor));
    error.insert("message".to_string(), ScriptValue::String(message));
    Ok(ScriptValue::Object(error))
}

pub fn is_namespace(name: &str) -> bool {
    matches!(name, "Math" | "Array" | "Number" | "Object")
}

pub fn call_namespace(namespace: &str, method: &str, args: &[ScriptValue]) -> BuiltinResult {
    let number = |index: usize| args.get(index).map_or(f64::NAN, ScriptValue::to_number);
    let result = match (namespace, method) {
        ("Math", "abs") => ScriptValue::Number(number(0).abs()),
        ("Math", "floor") => ScriptValue::Number(number(0).floor()),
        ("Math", "ceil") => ScriptValue::Number(number(0).ceil()),
        // JavaScript rounds half-way cases up, not away from zero.
        ("Math", "round") => ScriptValue::Number((number(0) + 0.5).floor()),
        ("Math", "trunc") => ScriptValue::Number(number(0).trunc()),
        ("Math", "sqrt") => ScriptValue::Number(number(0).sqrt()),
        ("Math", "pow") => ScriptValue::Number(number(0).powf(number(1))),
        ("Math", "min") => ScriptValue::Number(fold_numbers(args, f64::INFINITY, f64::min)),
        ("Math", "max") => ScriptValue::Number(fold_numbers(args, f64::NEG_INFINITY, f64::max)),
        ("Array", "isArray") => ScriptValue::Bool(matches!(args.first(), Some(ScriptValue::Array(_)))),
        ("Number", "isInteger") => ScriptValue::Bool(matches!(
            args.first(),
            Some(ScriptValue::Number(n)) if n.is_finite() && n.fract() == 0.0
        )),
        ("Number", "isNaN") => ScriptValue::Bool(matches!(
            args.first(),
            Some(ScriptValue::Number(n)) if n.is_nan()
        )),
        ("Object", "keys") => match args.first() {
            Some(ScriptValue::Object(map)) => {
                ScriptValue::Array(map.keys().cloned().map(ScriptValue::String).collect())
            }
            Some(ScriptValue::Array(items)) => ScriptValue::Array(
                (0..items.len())
                    .map(|index| ScriptValue::String(index.to_string()))
                    .collect(),
            ),
            _ => ScriptValue::Array(Vec::new()),
        },
        _ => {
            return Err(SandboxError::Script(format!(
                "TypeError: {}.{} is not a function",
                namespace, method
            )));
        }
    };
    Ok(result)
}

fn fold_numbers(args: &[ScriptValue], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    args.iter().map(ScriptValue::to_number).fold(init, |acc, number| {
        if acc.is_nan() || number.is_nan() {
            f64::NAN
        } else {
            pick(acc, number)
        }
    })
}

/// Free functions such as `parseInt`. `None` when `name` is not a builtin.
pub fn call_global(name: &str, args: &[ScriptValue]) -> Option<BuiltinResult> {
    let first = args.first().cloned().unwrap_or_default();
    let result = match name {
        "Number" => ScriptValue::Number(if args.is_empty() { 0.0 } else { first.to_number() }),
        "String" => ScriptValue::String(if args.is_empty() {
            String::new()
        } else {
            first.to_js_string()
        }),
        "Boolean" => ScriptValue::Bool(first.truthy()),
        "isNaN" => ScriptValue::Bool(first.to_number().is_nan()),
        "isFinite" => ScriptValue::Bool(first.to_number().is_finite()),
        "parseFloat" => ScriptValue::Number(parse_float_prefix(&first.to_js_string())),
        "parseInt" => {
            let radix = args.get(1).map(ScriptValue::to_number).filter(|r| *r >= 2.0 && *r <= 36.0);
            ScriptValue::Number(parse_int_prefix(&first.to_js_string(), radix.map(|r| r as u32)))
        }
        _ => return None,
    };
    Some(Ok(result))
}

/// Methods on strings, arrays and numbers. `None` when the method does not
/// exist for the receiver.
pub fn call_method(target: &ScriptValue, method: &str, args: &[ScriptValue]) -> Option<BuiltinResult> {
    if target.is_nullish() {
        return Some(Err(SandboxError::Script(format!(
            "TypeError: Cannot read properties of {} (reading '{}')",
            target.to_js_string(),
            method
        ))));
    }
    if method == "toString" {
        return Some(Ok(ScriptValue::String(target.to_js_string())));
    }
    let result = match target {
        ScriptValue::String(text) if method == "repeat" => return Some(repeat(text, args.first())),
        ScriptValue::String(text) => string_method(text, method, args)?,
        ScriptValue::Array(items) => match array_method(items, method, args)? {
            Ok(value) => value,
            Err(err) => return Some(Err(err)),
        },
        ScriptValue::Number(number) => match method {
            "toFixed" => {
                let digits = args.first().map_or(0.0, ScriptValue::to_number);
                let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
                ScriptValue::String(format!("{:.*}", digits, number))
            }
            _ => return None,
        },
        _ => return None,
    };
    Some(Ok(result))
}

fn string_method(text: &str, method: &str, args: &[ScriptValue]) -> Option<ScriptValue> {
    let arg_string = |index: usize| args.get(index).map(ScriptValue::to_js_string);
    let chars: Vec<char> = text.chars().collect();
    Some(match method {
        "trim" => ScriptValue::from(text.trim()),
        "trimStart" => ScriptValue::from(text.trim_start()),
        "trimEnd" => ScriptValue::from(text.trim_end()),
        "toLowerCase" => ScriptValue::String(text.to_lowercase()),
        "toUpperCase" => ScriptValue::String(text.to_uppercase()),
        "includes" => ScriptValue::Bool(text.contains(&arg_string(0).unwrap_or_default())),
        "startsWith" => ScriptValue::Bool(text.starts_with(&arg_string(0).unwrap_or_default())),
        "endsWith" => ScriptValue::Bool(text.ends_with(&arg_string(0).unwrap_or_default())),
        "indexOf" => {
            let needle = arg_string(0).unwrap_or_else(|| "undefined".to_string());
            ScriptValue::Number(
                text.find(&needle)
                    .map_or(-1.0, |byte| text[..byte].chars().count() as f64),
            )
        }
        "split" => match args.first() {
            None | Some(ScriptValue::Undefined) => {
                ScriptValue::Array(vec![ScriptValue::from(text)])
            }
            Some(separator) => {
                let separator = separator.to_js_string();
                if separator.is_empty() {
                    ScriptValue::Array(chars.iter().map(|c| ScriptValue::String(c.to_string())).collect())
                } else {
                    ScriptValue::Array(text.split(separator.as_str()).map(ScriptValue::from).collect())
                }
            }
        },
        "charAt" => {
            let index = args.first().map_or(0.0, ScriptValue::to_number);
            ScriptValue::String(
                array_index(&ScriptValue::Number(index))
                    .and_then(|i| chars.get(i))
                    .map(char::to_string)
                    .unwrap_or_default(),
            )
        }
        "substring" => {
            let len = chars.len();
            let clamp = |value: Option<&ScriptValue>, default: usize| match value {
                None | Some(ScriptValue::Undefined) => default,
                Some(value) => {
                    let n = value.to_number();
                    if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(len) }
                }
            };
            let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), len));
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            ScriptValue::String(chars[start..end].iter().collect())
        }
        "slice" => {
            let (start, end) = slice_bounds(chars.len(), args);
            ScriptValue::String(chars[start..end].iter().collect())
        }
        "replace" => {
            let pattern = arg_string(0).unwrap_or_default();
            let replacement = arg_string(1).unwrap_or_default();
            ScriptValue::String(text.replacen(&pattern, &replacement, 1))
        }
        _ => return None,
    })
}

fn repeat(text: &str, count: Option<&ScriptValue>) -> BuiltinResult {
    let count = count.map_or(0.0, ScriptValue::to_number);
    let count = if count.is_nan() || count < 0.0 { 0 } else { count as usize };
    if text.len().saturating_mul(count) > MAX_STRING_LEN {
        return Err(range_error("Invalid string length"));
    }
    Ok(ScriptValue::String(text.repeat(count)))
}

fn array_method(items: &[ScriptValue], method: &str, args: &[ScriptValue]) -> Option<BuiltinResult> {
    let needle = args.first().cloned().unwrap_or_default();
    Some(Ok(match method {
        "includes" => ScriptValue::Bool(items.iter().any(|item| {
            item.strict_eq(&needle)
                || matches!((item, &needle), (ScriptValue::Number(a), ScriptValue::Number(b)) if a.is_nan() && b.is_nan())
        })),
        "indexOf" => ScriptValue::Number(
            items
                .iter()
                .position(|item| item.strict_eq(&needle))
                .map_or(-1.0, |index| index as f64),
        ),
        "join" => {
            let separator = match args.first() {
                None | Some(ScriptValue::Undefined) => ",".to_string(),
                Some(separator) => separator.to_js_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string() })
                .collect();
            let total = parts
                .iter()
                .map(String::len)
                .sum::<usize>()
                .saturating_add(separator.len().saturating_mul(parts.len()));
            if total > MAX_STRING_LEN {
                return Some(Err(range_error("Invalid string length")));
            }
            ScriptValue::String(parts.join(&separator))
        }
        "slice" => {
            let (start, end) = slice_bounds(items.len(), args);
            ScriptValue::Array(items[start..end].to_vec())
        }
        "concat" => {
            let added: usize = args
                .iter()
                .map(|arg| match arg {
                    ScriptValue::Array(more) => more.len(),
                    _ => 1,
                })
                .sum();
            if items.len().saturating_add(added) > MAX_ARRAY_LEN {
                return Some(Err(range_error("Invalid array length")));
            }
            let mut joined = items.to_vec();
            for arg in args {
                match arg {
                    ScriptValue::Array(more) => joined.extend(more.iter().cloned()),
                    other => joined.push(other.clone()),
                }
            }
            ScriptValue::Array(joined)
        }
        _ => return None,
    }))
}

/// `slice(start, end)` bounds with negative offsets counted from the end.
fn slice_bounds(len: usize, args: &[ScriptValue]) -> (usize, usize) {
    let resolve = |value: Option<&ScriptValue>, default: usize| match value {
        None | Some(ScriptValue::Undefined) => default,
        Some(value) => {
            let n = value.to_number().trunc();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                len.saturating_sub((-n) as usize)
            } else {
                (n as usize).min(len)
            }
        }
    };
    let start = resolve(args.first(), 0);
    let end = resolve(args.get(1), len);
    (start, end.max(start))
}

fn parse_float_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = trimmed.as_bytes();
    while end < bytes.len() {
        let c = bytes[end];
        let accepted = match c {
            b'0'..=b'9' => true,
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !accepted {
            break;
        }
        end += 1;
    }
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    // Back off a dangling exponent or sign, e.g. "1e" or "2e+".
    let mut candidate = &trimmed[..end];
    while !candidate.is_empty() {
        if let Ok(number) = candidate.parse::<f64>() {
            return number;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    f64::NAN
}

fn parse_int_prefix(text: &str, radix: Option<u32>) -> f64 {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (radix, digits) = match radix {
        None | Some(16) if unsigned.starts_with("0x") || unsigned.starts_with("0X") => {
            (16, &unsigned[2..])
        }
        Some(radix) => (radix, unsigned),
        None => (10, unsigned),
    };
    let prefix: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if prefix.is_empty() {
        return f64::NAN;
    }
    let magnitude = prefix
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, digit| acc * f64::from(radix) + f64::from(digit));
    if negative { -magnitude } else { magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> ScriptValue {
        ScriptValue::from(text)
    }

    #[test]
    fn property_reads() {
        assert_eq!(get_property(&s("héllo"), &s("length")), Ok(ScriptValue::Number(5.0)));
        let err = get_property(&ScriptValue::Undefined, &s("x")).expect_err("undefined");
        assert_eq!(
            err.to_string(),
            "TypeError: Cannot read properties of undefined (reading 'x')"
        );
    }

    #[test]
    fn string_methods() {
        let call = |text: &str, method: &str, args: &[ScriptValue]| {
            call_method(&s(text), method, args).expect("method").expect("ok")
        };
        assert_eq!(call("  a b ", "trim", &[]), s("a b"));
        assert_eq!(
            call("a,b", "split", &[s(",")]),
            ScriptValue::Array(vec![s("a"), s("b")])
        );
        assert_eq!(call("hello", "slice", &[ScriptValue::Number(-3.0)]), s("llo"));
        assert_eq!(call("hello", "substring", &[ScriptValue::Number(3.0), ScriptValue::Number(1.0)]), s("el"));
        assert!(call_method(&s("x"), "nope", &[]).is_none());
    }

    #[test]
    fn growth_past_the_size_limits_is_a_range_error() {
        let err = call_method(&s("x"), "repeat", &[ScriptValue::Number(1e20)])
            .expect("method")
            .expect_err("too long");
        assert_eq!(err.to_string(), "RangeError: Invalid string length");
        assert_eq!(
            call_method(&s("ab"), "repeat", &[ScriptValue::Number(2.0)]),
            Some(Ok(s("abab")))
        );
        assert_eq!(
            call_method(&s("ab"), "repeat", &[ScriptValue::Number(f64::INFINITY)])
                .expect("method")
                .map_err(|err| err.to_string()),
            Err("RangeError: Invalid string length".to_string())
        );

        let big = ScriptValue::Array(vec![ScriptValue::Null; MAX_ARRAY_LEN]);
        let err = call_method(&big, "concat", &[big.clone()])
            .expect("method")
            .expect_err("too long");
        assert_eq!(err.to_string(), "RangeError: Invalid array length");

        let wide = ScriptValue::Array(vec![s(&"y".repeat(1024)); 8 * 1024]);
        assert!(call_method(&wide, "join", &[]).expect("method").is_err());

        assert!(bounded(s(&"z".repeat(MAX_STRING_LEN + 1))).is_err());
        assert_eq!(bounded(s("fine")), Ok(s("fine")));
    }

    #[test]
    fn numeric_globals() {
        let global = |name: &str, arg: ScriptValue| call_global(name, &[arg]).expect("global").expect("ok");
        assert_eq!(global("parseInt", s("42px")), ScriptValue::Number(42.0));
        assert_eq!(global("parseInt", s("-0x1f")), ScriptValue::Number(-31.0));
        assert_eq!(global("parseFloat", s("3.5e1kg")), ScriptValue::Number(35.0));
        assert_eq!(global("Number", s("")), ScriptValue::Number(0.0));
        assert_eq!(
            call_namespace("Math", "round", &[ScriptValue::Number(-2.5)]),
            Ok(ScriptValue::Number(-2.0))
        );
        assert!(call_global("eval", &[]).is_none());
    }

    #[test]
    fn errors_are_constructed_as_objects() {
        let error = construct("TypeError", &[s("bad")]).expect("construct");
        assert_eq!(get_property(&error, &s("message")), Ok(s("bad")));
        assert!(construct("Date", &[]).is_err());
    }
}
