//! Lookups into submission data by dotted/bracketed path (`a.b[0].c`).

use serde_json::Value;

/// Splits `a.b[0].c` into `["a", "b", "0", "c"]`.
pub fn segments(path: &str) -> Vec<&str> {
    path.split(['.', '[', ']'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Value at `path`, descending objects by key and arrays by index.
pub fn value_at<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    segments(path)
        .into_iter()
        .try_fold(root, |current, segment| child(current, segment))
}

fn child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// First value stored under `key` anywhere in `data`, searching depth-first.
///
/// Used by declarative conditionals, whose `when` names a component key
/// rather than a full path.
pub fn find_key<'v>(data: &'v Value, key: &str) -> Option<&'v Value> {
    if let Some(found) = value_at(data, key) {
        return Some(found);
    }
    match data {
        Value::Object(map) => map.values().find_map(|value| find_key(value, key)),
        Value::Array(items) => items.iter().find_map(|value| find_key(value, key)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_and_bracketed_paths() {
        let data = json!({ "a": { "b": [{ "c": 1 }, { "c": 2 }] } });
        assert_eq!(value_at(&data, "a.b[1].c"), Some(&json!(2)));
        assert_eq!(value_at(&data, "a.b.0.c"), Some(&json!(1)));
        assert_eq!(value_at(&data, "a.x"), None);
        assert_eq!(value_at(&data, ""), Some(&data));
    }

    #[test]
    fn find_key_searches_nested_data() {
        let data = json!({ "outer": { "rows": [{ "pet": "cat" }] } });
        assert_eq!(find_key(&data, "pet"), Some(&json!("cat")));
        assert_eq!(find_key(&data, "missing"), None);
    }
}
