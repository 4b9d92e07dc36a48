use std::collections::BTreeMap;
use std::time::Instant;

use super::builtins;
use super::parser::{BinaryOp, Expr, LogicalOp, Stmt, UnaryOp};
use super::value::ScriptValue;
use crate::error::SandboxError;

type EvalResult<T> = Result<T, SandboxError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Return,
}

/// Tree-walking evaluator over a single flat global scope.
///
/// The deadline is checked before every statement, every expression and
/// every loop iteration, so `while (true) {}` ends in a timeout instead of
/// hanging the caller.
pub(crate) struct Interpreter {
    scope: BTreeMap<String, ScriptValue>,
    deadline: Option<Instant>,
    timeout_ms: u64,
}

impl Interpreter {
    pub fn new(
        scope: BTreeMap<String, ScriptValue>,
        deadline: Option<Instant>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            scope,
            deadline,
            timeout_ms,
        }
    }

    pub fn run(&mut self, program: &[Stmt]) -> EvalResult<()> {
        for stmt in program {
            if self.exec(stmt)? == Flow::Return {
                break;
            }
        }
        Ok(())
    }

    pub fn into_scope(self) -> BTreeMap<String, ScriptValue> {
        self.scope
    }

    fn tick(&self) -> EvalResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SandboxError::Timeout {
                timeout_ms: self.timeout_ms,
            }),
            _ => Ok(()),
        }
    }

    fn exec(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Declare(bindings) => {
                for (name, init) in bindings {
                    match init {
                        Some(init) => {
                            let value = self.eval(init)?;
                            self.scope.insert(name.clone(), value);
                        }
                        None => {
                            self.scope.entry(name.clone()).or_default();
                        }
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.exec(consequent)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { test, body } => {
                loop {
                    self.tick()?;
                    if !self.eval(test)?.truthy() {
                        break;
                    }
                    if self.exec(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init
                    && self.exec(init)? == Flow::Return
                {
                    return Ok(Flow::Return);
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test
                        && !self.eval(test)?.truthy()
                    {
                        break;
                    }
                    if self.exec(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                    if let Some(update) = update {
                        self.eval(update)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => {
                for stmt in body {
                    if self.exec(stmt)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.eval(value)?;
                }
                Ok(Flow::Return)
            }
            Stmt::Throw(value) => {
                let thrown = self.eval(value)?;
                Err(SandboxError::Script(thrown_message(&thrown)))
            }
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<ScriptValue> {
        self.tick()?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self.lookup(name),
            Expr::Array(items) => Ok(ScriptValue::Array(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<EvalResult<_>>()?,
            )),
            Expr::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(ScriptValue::Object(map))
            }
            Expr::Member { object, property } => {
                let target = self.eval(object)?;
                let key = self.eval(property)?;
                builtins::get_property(&target, &key)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::New { constructor, args } => {
                let args = self.eval_args(args)?;
                builtins::construct(constructor, &args)
            }
            Expr::Unary { op, operand } => {
                if *op == UnaryOp::TypeOf
                    && let Expr::Ident(name) = operand.as_ref()
                    && !self.scope.contains_key(name)
                {
                    return Ok(ScriptValue::from("undefined"));
                }
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => ScriptValue::Bool(!value.truthy()),
                    UnaryOp::Neg => ScriptValue::Number(-value.to_number()),
                    UnaryOp::Plus => ScriptValue::Number(value.to_number()),
                    UnaryOp::TypeOf => ScriptValue::from(value.type_of()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                builtins::bounded(apply_binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign { op, target, value } => {
                let value = match op {
                    None => self.eval(value)?,
                    Some(op) => {
                        let current = self.eval(target)?;
                        let rhs = self.eval(value)?;
                        builtins::bounded(apply_binary(*op, &current, &rhs))?
                    }
                };
                self.assign(target, value.clone())?;
                Ok(value)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign(target, ScriptValue::Number(new))?;
                Ok(ScriptValue::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<ScriptValue> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        match name {
            "NaN" => Ok(ScriptValue::Number(f64::NAN)),
            "Infinity" => Ok(ScriptValue::Number(f64::INFINITY)),
            _ => Err(reference_error(name)),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> EvalResult<Vec<ScriptValue>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> EvalResult<ScriptValue> {
        match callee {
            Expr::Member { object, property } => {
                let method = self.eval(property)?.to_js_string();
                if let Expr::Ident(namespace) = object.as_ref()
                    && !self.scope.contains_key(namespace)
                    && builtins::is_namespace(namespace)
                {
                    let args = self.eval_args(args)?;
                    return builtins::call_namespace(namespace, &method, &args);
                }
                let target = self.eval(object)?;
                let args = self.eval_args(args)?;
                builtins::call_method(&target, &method, &args)
                    .unwrap_or_else(|| Err(not_a_function(&callee_label(callee))))
            }
            Expr::Ident(name) if !self.scope.contains_key(name) => {
                let args = self.eval_args(args)?;
                builtins::call_global(name, &args)
                    .unwrap_or_else(|| Err(reference_error(name)))
            }
            other => {
                self.eval(other)?;
                Err(not_a_function(&callee_label(other)))
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: ScriptValue) -> EvalResult<()> {
        match target {
            Expr::Ident(name) => {
                self.scope.insert(name.clone(), value);
                Ok(())
            }
            Expr::Member { .. } => {
                let (root, keys) = self.target_path(target)?;
                let Some(root) = root else {
                    // Writes into a temporary are unobservable.
                    return Ok(());
                };
                let slot = self
                    .scope
                    .get_mut(&root)
                    .ok_or_else(|| reference_error(&root))?;
                write_path(slot, &keys, value)
            }
            _ => Err(SandboxError::Script(
                "SyntaxError: Invalid left-hand side in assignment".to_string(),
            )),
        }
    }

    fn target_path(&mut self, expr: &Expr) -> EvalResult<(Option<String>, Vec<ScriptValue>)> {
        match expr {
            Expr::Ident(name) => Ok((Some(name.clone()), Vec::new())),
            Expr::Member { object, property } => {
                let (root, mut keys) = self.target_path(object)?;
                keys.push(self.eval(property)?);
                Ok((root, keys))
            }
            other => {
                self.eval(other)?;
                Ok((None, Vec::new()))
            }
        }
    }
}

fn write_path(slot: &mut ScriptValue, keys: &[ScriptValue], value: ScriptValue) -> EvalResult<()> {
    let Some((last, parents)) = keys.split_last() else {
        *slot = value;
        return Ok(());
    };
    let mut current = slot;
    for key in parents {
        let next = match current {
            ScriptValue::Object(map) => map.get_mut(&key.to_js_string()),
            ScriptValue::Array(items) => builtins::array_index(key).and_then(|i| items.get_mut(i)),
            _ => None,
        };
        current = next.ok_or_else(|| set_error("undefined", last))?;
    }
    match current {
        ScriptValue::Object(map) => {
            map.insert(last.to_js_string(), value);
        }
        ScriptValue::Array(items) => {
            if let Some(index) = builtins::array_index(last) {
                if index >= builtins::MAX_ARRAY_LEN {
                    return Err(builtins::range_error("Invalid array length"));
                }
                if index >= items.len() {
                    items.resize(index + 1, ScriptValue::Undefined);
                }
                items[index] = value;
            }
        }
        ScriptValue::Undefined => return Err(set_error("undefined", last)),
        ScriptValue::Null => return Err(set_error("null", last)),
        _ => {}
    }
    Ok(())
}

pub(crate) fn apply_binary(op: BinaryOp, left: &ScriptValue, right: &ScriptValue) -> ScriptValue {
    use std::cmp::Ordering;

    match op {
        BinaryOp::Add => {
            let is_textual = |value: &ScriptValue| {
                matches!(
                    value,
                    ScriptValue::String(_) | ScriptValue::Array(_) | ScriptValue::Object(_)
                )
            };
            if is_textual(left) || is_textual(right) {
                ScriptValue::String(left.to_js_string() + &right.to_js_string())
            } else {
                ScriptValue::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => ScriptValue::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => ScriptValue::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => ScriptValue::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => ScriptValue::Number(left.to_number() % right.to_number()),
        BinaryOp::StrictEq => ScriptValue::Bool(left.strict_eq(right)),
        BinaryOp::StrictNe => ScriptValue::Bool(!left.strict_eq(right)),
        BinaryOp::LooseEq => ScriptValue::Bool(left.loose_eq(right)),
        BinaryOp::LooseNe => ScriptValue::Bool(!left.loose_eq(right)),
        BinaryOp::Lt => ScriptValue::Bool(left.compare(right) == Some(Ordering::Less)),
        BinaryOp::Gt => ScriptValue::Bool(left.compare(right) == Some(Ordering::Greater)),
        BinaryOp::Le => ScriptValue::Bool(matches!(
            left.compare(right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Ge => ScriptValue::Bool(matches!(
            left.compare(right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    }
}

/// `String(err)` for a thrown value: `name: message` for error objects.
fn thrown_message(thrown: &ScriptValue) -> String {
    match thrown {
        ScriptValue::Object(map) if map.contains_key("message") => {
            let name = map
                .get("name")
                .map(ScriptValue::to_js_string)
                .unwrap_or_else(|| "Error".to_string());
            let message = map
                .get("message")
                .map(ScriptValue::to_js_string)
                .unwrap_or_default();
            if message.is_empty() {
                name
            } else {
                format!("{}: {}", name, message)
            }
        }
        other => other.to_js_string(),
    }
}

fn callee_label(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member { object, property } => match property.as_ref() {
            Expr::Literal(ScriptValue::String(name)) => {
                format!("{}.{}", callee_label(object), name)
            }
            _ => format!("{}[...]", callee_label(object)),
        },
        Expr::Call { callee, .. } => format!("{}(...)", callee_label(callee)),
        _ => "expression".to_string(),
    }
}

fn reference_error(name: &str) -> SandboxError {
    SandboxError::Script(format!("ReferenceError: {} is not defined", name))
}

fn not_a_function(label: &str) -> SandboxError {
    SandboxError::Script(format!("TypeError: {} is not a function", label))
}

fn set_error(target: &str, key: &ScriptValue) -> SandboxError {
    SandboxError::Script(format!(
        "TypeError: Cannot set properties of {} (setting '{}')",
        target,
        key.to_js_string()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::parser::parse_program;

    fn run(script: &str) -> EvalResult<BTreeMap<String, ScriptValue>> {
        let program = parse_program(script, 64)?;
        let mut interpreter = Interpreter::new(BTreeMap::new(), None, 0);
        interpreter.run(&program)?;
        Ok(interpreter.into_scope())
    }

    #[test]
    fn index_writes_grow_arrays_up_to_the_limit() {
        let scope = run("var a = []; a[2] = 1;").expect("runs");
        assert_eq!(
            scope.get("a"),
            Some(&ScriptValue::Array(vec![
                ScriptValue::Undefined,
                ScriptValue::Undefined,
                ScriptValue::Number(1.0)
            ]))
        );

        for script in ["var a = []; a[1e20] = 1;", "var a = []; a[1e9] = 1;"] {
            let err = run(script).expect_err("rejected");
            assert_eq!(err.to_string(), "RangeError: Invalid array length", "{}", script);
        }
    }

    #[test]
    fn concatenation_past_the_limit_fails() {
        let mut slot = ScriptValue::Array(Vec::new());
        let index = ScriptValue::Number(builtins::MAX_ARRAY_LEN as f64);
        assert!(write_path(&mut slot, &[index], ScriptValue::Null).is_err());

        let err = run("var s = 'x'.repeat(4 * 1024 * 1024); s += 'y';").expect_err("too long");
        assert_eq!(err.to_string(), "RangeError: Invalid string length");
        let err = run("var s = 'x'.repeat(3 * 1024 * 1024); t = s + s;").expect_err("too long");
        assert_eq!(err.to_string(), "RangeError: Invalid string length");
    }
}
