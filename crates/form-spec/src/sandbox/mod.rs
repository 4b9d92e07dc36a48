//! Time-boxed evaluation of author-supplied scripts.
//!
//! Scripts are written in a small JavaScript subset (variables, `if`,
//! loops, operators, member access, a few string/array/Math builtins).
//! There is no access to the host: no I/O, no clock, no function
//! definitions, no prototypes. Each run gets a deep copy of its bindings and
//! a wall-clock deadline; the final global scope is handed back so callers
//! can read output variables such as `valid` or `show`.

mod builtins;
mod interp;
mod lexer;
mod parser;
mod value;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::trace;

use crate::config::DEFAULT_MAX_SCRIPT_DEPTH;
use crate::error::SandboxError;
use interp::Interpreter;

pub use value::{ScriptValue, format_number, number_value};

/// Named values visible to a script as globals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, ScriptValue>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ScriptValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert_json(&mut self, name: impl Into<String>, value: &Value) -> &mut Self {
        self.insert(name, ScriptValue::from(value))
    }

    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.values.get(name)
    }

    /// JSON form of a binding; `None` when unset or `undefined`.
    pub fn get_json(&self, name: &str) -> Option<Value> {
        self.get(name).and_then(ScriptValue::to_json)
    }

    pub fn into_json(self) -> Value {
        Value::Object(
            self.values
                .into_iter()
                .filter_map(|(name, value)| value.to_json().map(|json| (name, json)))
                .collect::<Map<_, _>>(),
        )
    }
}

impl From<Map<String, Value>> for Bindings {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            values: map
                .iter()
                .map(|(name, value)| (name.clone(), ScriptValue::from(value)))
                .collect(),
        }
    }
}

/// Script runner. Cheap to clone and share; every call is independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    max_depth: usize,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCRIPT_DEPTH)
    }
}

impl Sandbox {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Runs `script` with `bindings` as its globals and returns the globals
    /// as they stand when the script finishes.
    ///
    /// The deadline covers parsing and evaluation. A script that runs past
    /// it fails with [`SandboxError::Timeout`]; a thrown value or a runtime
    /// fault fails with [`SandboxError::Script`].
    pub fn execute(
        &self,
        script: &str,
        bindings: Bindings,
        timeout: Duration,
    ) -> Result<Bindings, SandboxError> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        let program = parser::parse_program(script, self.max_depth)?;
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(SandboxError::Timeout { timeout_ms });
        }

        let mut interpreter = Interpreter::new(bindings.values, deadline, timeout_ms);
        let outcome = interpreter.run(&program);
        trace!(
            elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            ok = outcome.is_ok(),
            "script finished"
        );
        outcome?;
        Ok(Bindings {
            values: interpreter.into_scope(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(script: &str, globals: Value) -> Result<Bindings, SandboxError> {
        let Value::Object(map) = globals else {
            panic!("globals must be an object");
        };
        Sandbox::default().execute(script, Bindings::from(map), Duration::from_millis(250))
    }

    #[test]
    fn reads_inputs_and_writes_outputs() {
        let out = run(
            "valid = (input.length > 2) ? true : 'Too short';",
            json!({ "input": "ab", "valid": true }),
        )
        .expect("runs");
        assert_eq!(out.get_json("valid"), Some(json!("Too short")));
    }

    #[test]
    fn nested_writes_update_bindings() {
        let out = run(
            "data.total = 0; for (var i = 0; i < data.items.length; i++) { data.total += data.items[i]; }",
            json!({ "data": { "items": [1, 2, 3] } }),
        )
        .expect("runs");
        assert_eq!(out.get_json("data"), Some(json!({ "items": [1, 2, 3], "total": 6 })));
    }

    #[test]
    fn infinite_loops_time_out() {
        let started = Instant::now();
        let err = Sandbox::default()
            .execute("while (true) {}", Bindings::new(), Duration::from_millis(20))
            .expect_err("times out");
        assert_eq!(err, SandboxError::Timeout { timeout_ms: 20 });
        assert_eq!(err.to_string(), "Error: Script execution timed out after 20ms");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn thrown_errors_and_faults_are_script_errors() {
        let err = run("throw new Error('nope')", json!({})).expect_err("throws");
        assert_eq!(err.to_string(), "Error: nope");

        let err = run("valid = missing + 1", json!({})).expect_err("reference");
        assert_eq!(err.to_string(), "ReferenceError: missing is not defined");

        let err = run("valid = row.a.b", json!({ "row": {} })).expect_err("type error");
        assert_eq!(
            err.to_string(),
            "TypeError: Cannot read properties of undefined (reading 'b')"
        );
    }

    #[test]
    fn hostile_sizes_and_offsets_stay_contained() {
        let rejected = [
            "valid = 'x'.repeat(1e20)",
            "valid = 'x'.repeat(Infinity)",
            "var a = []; a[1e20] = 1",
            "var a = []; a[1e9] = 1",
            "var s = 'ab'; for (var i = 0; i < 40; i++) { s = s + s; }",
            "var a = [1]; for (var i = 0; i < 40; i++) { a = a.concat(a); }",
        ];
        for script in rejected {
            match run(script, json!({})) {
                Err(SandboxError::Script(message)) => {
                    assert!(message.starts_with("RangeError"), "{}: {}", script, message)
                }
                other => panic!("{}: {:?}", script, other),
            }
        }

        let bounded = [
            ("valid = 'abc'.substring(1, 1e300)", json!("bc")),
            ("valid = 'abc'.substring(-1e300, 1e300)", json!("abc")),
            ("valid = 'abc'.slice(-1e300, 1e300)", json!("abc")),
            ("valid = 'abc'.slice(1e300)", json!("")),
            ("valid = [1, 2, 3].slice(-1e300, 1e20)", json!([1, 2, 3])),
            ("valid = 'abc'[1e300]", Value::Null),
            ("valid = (1.5).toFixed(1e9)", json!(format!("{:.100}", 1.5))),
        ];
        for (script, expected) in bounded {
            let out = run(script, json!({})).unwrap_or_else(|err| panic!("{}: {}", script, err));
            assert_eq!(out.get_json("valid").unwrap_or(Value::Null), expected, "{}", script);
        }
    }

    #[test]
    fn typeof_guards_undeclared_names() {
        let out = run("show = typeof other === 'undefined'", json!({})).expect("runs");
        assert_eq!(out.get_json("show"), Some(json!(true)));
    }

    #[test]
    fn bindings_are_copies() {
        let data = json!({ "a": 1 });
        let mut bindings = Bindings::new();
        bindings.insert_json("data", &data);
        let out = Sandbox::default()
            .execute("data.a = 2", bindings, Duration::from_millis(100))
            .expect("runs");
        assert_eq!(out.get_json("data"), Some(json!({ "a": 2 })));
        assert_eq!(data, json!({ "a": 1 }));
    }

    #[test]
    fn builtins_and_coercions() {
        let out = run(
            "var words = input.trim().split(' '); \
             count = words.length; \
             upper = input.toUpperCase().includes('B'); \
             sum = '1' + 2; n = Number('4') * 2; r = Math.max(1, 7, 3);",
            json!({ "input": " a b " }),
        )
        .expect("runs");
        assert_eq!(
            out.into_json(),
            json!({
                "input": " a b ",
                "words": ["a", "b"],
                "count": 2,
                "upper": true,
                "sum": "12",
                "n": 8,
                "r": 7
            })
        );
    }
}
