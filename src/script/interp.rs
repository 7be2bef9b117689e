//! Tree-walking evaluator.

use std::collections::BTreeMap;

use tracing::trace;

use super::ast::{Expr, FPart, Stmt, StmtKind, Target};
use super::builtins::{self, Effects};
use super::error::{ScriptError, ScriptResult};
use super::ops;
use super::parser::COMPREHENSION;
use super::value::Value;
use crate::domain::ChartSpec;

/// What a successful run leaves behind
#[derive(Debug)]
pub struct Execution {
    pub stdout: String,
    pub scope: BTreeMap<String, Value>,
    pub charts: Vec<ChartSpec>,
}

pub struct Interpreter {
    scope: BTreeMap<String, Value>,
    effects: Effects,
    steps: u64,
    max_steps: u64,
}

impl Interpreter {
    pub fn new(scope: BTreeMap<String, Value>, max_steps: u64) -> Self {
        Self {
            scope,
            effects: Effects::default(),
            steps: 0,
            max_steps,
        }
    }

    pub fn run(mut self, program: &[Stmt]) -> ScriptResult<Execution> {
        self.exec_block(program)?;
        trace!(steps = self.steps, "Script finished");
        Ok(Execution {
            stdout: self.effects.stdout,
            scope: self.scope,
            charts: self.effects.charts,
        })
    }

    fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ScriptError::StepLimit {
                limit: self.max_steps,
            });
        }
        Ok(())
    }

    fn exec_block(&mut self, body: &[Stmt]) -> ScriptResult<()> {
        for stmt in body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> ScriptResult<()> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign(target, expr) => {
                let value = self.eval(expr)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign(target, op, expr) => {
                let current = match target {
                    Target::Name(name) => self.lookup(name)?,
                    Target::Index(name, key) => {
                        let key = self.eval(key)?;
                        builtins::index(&self.lookup(name)?, &key)?
                    }
                };
                let operand = self.eval(expr)?;
                let value = ops::binary(*op, &current, &operand)?;
                self.assign(target, value)?;
            }
            StmtKind::For { var, iter, body } => {
                let items = builtins::iterate(&self.eval(iter)?)?;
                for item in items {
                    self.tick()?;
                    self.scope.insert(var.clone(), item);
                    self.exec_block(body)?;
                }
            }
            StmtKind::If { branches, orelse } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.truthy()? {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(orelse)?;
            }
            StmtKind::Raise { kind, message } => {
                let message = match message {
                    Some(expr) => self.eval(expr)?.to_string(),
                    None => String::new(),
                };
                return Err(ScriptError::Raised {
                    kind: kind.clone(),
                    message,
                });
            }
            StmtKind::Pass => {}
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> ScriptResult<Value> {
        self.scope
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::NameError(name.to_string()))
    }

    fn assign(&mut self, target: &Target, value: Value) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                self.scope.insert(name.clone(), value);
                Ok(())
            }
            Target::Index(name, key) => {
                let key = self.eval(key)?;
                let container = self
                    .scope
                    .get_mut(name)
                    .ok_or_else(|| ScriptError::NameError(name.clone()))?;
                builtins::set_item(container, &key, value)
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        Ok(match expr {
            Expr::None => Value::None,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(x) => Value::Float(*x),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::FString(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        FPart::Literal(literal) => text.push_str(literal),
                        FPart::Field { expr, spec } => {
                            let value = self.eval(expr)?;
                            match spec {
                                Some(spec) => text.push_str(&builtins::format_value(&value, spec)?),
                                None => text.push_str(&value.to_string()),
                            }
                        }
                    }
                }
                Value::Str(text)
            }
            Expr::Name(name) => self.lookup(name)?,
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Value::List(values)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                ops::unary(*op, &operand)?
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)?
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy()? {
                    self.eval(right)?
                } else {
                    left
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy()? {
                    left
                } else {
                    self.eval(right)?
                }
            }
            Expr::Attribute(object, name) => {
                let object = self.eval(object)?;
                builtins::attribute(&object, name)?
            }
            Expr::Index(object, key) => {
                let object = self.eval(object)?;
                let key = self.eval(key)?;
                builtins::index(&object, &key)?
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => self.call(callee, args, kwargs)?,
        })
    }

    fn eval_args(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> ScriptResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::with_capacity(args.len());
        for arg in args {
            positional.push(self.eval(arg)?);
        }
        let mut keywords = Vec::with_capacity(kwargs.len());
        for (name, arg) in kwargs {
            keywords.push((name.clone(), self.eval(arg)?));
        }
        Ok((positional, keywords))
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> ScriptResult<Value> {
        if let Expr::Name(name) = callee {
            if name == COMPREHENSION {
                return self.comprehension(args);
            }
        }

        if let Expr::Attribute(object, method) = callee {
            // lists and charts bound to a name are mutated in place
            if let Expr::Name(var) = object.as_ref() {
                if matches!(self.scope.get(var), Some(Value::List(_) | Value::Chart(_))) {
                    let (positional, keywords) = self.eval_args(args, kwargs)?;
                    if let Some(mut receiver) = self.scope.remove(var) {
                        let result = builtins::call_method(
                            &mut self.effects,
                            &mut receiver,
                            method,
                            &positional,
                            &keywords,
                        );
                        self.scope.insert(var.clone(), receiver);
                        return result;
                    }
                }
            }
            let mut receiver = self.eval(object)?;
            let (positional, keywords) = self.eval_args(args, kwargs)?;
            return builtins::call_method(
                &mut self.effects,
                &mut receiver,
                method,
                &positional,
                &keywords,
            );
        }

        let function = self.eval(callee)?;
        let (positional, keywords) = self.eval_args(args, kwargs)?;
        match function {
            Value::Builtin(builtin) => {
                builtins::call_function(&mut self.effects, builtin, &positional, &keywords)
            }
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// `[element for var in iterable if condition]`; `var` does not leak
    fn comprehension(&mut self, args: &[Expr]) -> ScriptResult<Value> {
        let [Expr::Str(var), iterable, element, condition] = args else {
            return Err(ScriptError::syntax(0, "malformed comprehension"));
        };
        let items = builtins::iterate(&self.eval(iterable)?)?;
        let shadowed = self.scope.remove(var);

        let mut collected = Vec::new();
        let mut outcome = Ok(());
        for item in items {
            self.scope.insert(var.clone(), item);
            let step = self.tick().and_then(|_| {
                if self.eval(condition)?.truthy()? {
                    collected.push(self.eval(element)?);
                }
                Ok(())
            });
            if step.is_err() {
                outcome = step;
                break;
            }
        }

        match shadowed {
            Some(previous) => {
                self.scope.insert(var.clone(), previous);
            }
            None => {
                self.scope.remove(var);
            }
        }
        outcome.map(|_| Value::List(collected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{builtins::scope, parser::parse};

    fn run(source: &str) -> ScriptResult<Execution> {
        Interpreter::new(scope(), 100_000).run(&parse(source)?)
    }

    #[test]
    fn test_assignment_and_print() {
        let result = run("x = 2\ny = x * 3\nprint(f'{x} and {y}')").unwrap();
        assert_eq!(result.stdout, "2 and 6\n");
        assert_eq!(result.scope["y"], Value::Int(6));
    }

    #[test]
    fn test_oversized_sequences_fail_without_aborting() {
        let err = run("s = 'x' * (10**15)").unwrap_err();
        assert_eq!(err.kind(), "MemoryError");
        let err = run("xs = [0] * 10**12").unwrap_err();
        assert_eq!(err.kind(), "MemoryError");
        let err = run("s = 'x'\nfor i in range(60):\n    s = s + s").unwrap_err();
        assert_eq!(err.kind(), "MemoryError");
        let err = run("print(f'{1:>99999999999}')").unwrap_err();
        assert_eq!(err.to_string(), "Too many decimal digits in format string");
        let err = run("r = range(-2**62, 2**62)").unwrap_err();
        assert_eq!(err.kind(), "ValueError");
    }

    #[test]
    fn test_control_flow() {
        let source = "\
total = 0
for i in range(5):
    if i % 2 == 0:
        total += i
    elif i == 3:
        pass
    else:
        total -= 1
print(total)
";
        assert_eq!(run(source).unwrap().stdout, "5\n");
    }

    #[test]
    fn test_list_append_mutates_binding() {
        let result = run("xs = []\nfor i in range(3):\n    xs.append(i * i)\nprint(xs)").unwrap();
        assert_eq!(result.stdout, "[0, 1, 4]\n");
    }

    #[test]
    fn test_comprehension_does_not_leak() {
        let result = run("squares = [n * n for n in range(4) if n > 0]\nprint(squares)").unwrap();
        assert_eq!(result.stdout, "[1, 4, 9]\n");
        assert!(!result.scope.contains_key("n"));
    }

    #[test]
    fn test_errors_surface_with_python_messages() {
        let err = run("print(1 / 0)").unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
        let err = run("print(missing)").unwrap_err();
        assert_eq!(err.to_string(), "name 'missing' is not defined");
        let err = run("raise ValueError('bad input')").unwrap_err();
        assert_eq!(err.kind(), "ValueError");
        assert_eq!(err.to_string(), "bad input");
    }

    #[test]
    fn test_step_budget() {
        let source = "total = 0\nfor i in range(1000):\n    total += i\n";
        let err = Interpreter::new(scope(), 50)
            .run(&parse(source).unwrap())
            .unwrap_err();
        assert_eq!(err, ScriptError::StepLimit { limit: 50 });
    }

    #[test]
    fn test_show_and_sink_capture_charts() {
        let source = "\
fig = px.line(x=[1, 2], y=[3, 4])
fig.update_layout(title='Trend')
fig.show()
plotly_figures.append(px.pie(names=['a', 'b', 'a']))
";
        let result = run(source).unwrap();
        assert_eq!(result.charts.len(), 2);
        assert_eq!(result.charts[0].title.as_deref(), Some("Trend"));
    }
}
