//! Operators with Python semantics, broadcast element-wise over series.

use std::cmp::Ordering;

use super::ast::{BinaryOp, UnaryOp};
use super::error::{ScriptError, ScriptResult};
use super::frame::{Column, Series};
use super::value::Value;

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    if matches!(op, BinaryOp::In | BinaryOp::NotIn) {
        let found = contains(right, left)?;
        return Ok(Value::Bool(found == (op == BinaryOp::In)));
    }
    match (left, right) {
        (Value::Series(a), Value::Series(b)) => series_with_series(op, a, b),
        (Value::Series(series), scalar) => series_with_scalar(op, series, scalar, false),
        (scalar, Value::Series(series)) => series_with_scalar(op, series, scalar, true),
        _ => scalar(op, left, right),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> ScriptResult<Value> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!operand.truthy()?));
    }
    let negate = op == UnaryOp::Neg;
    match operand {
        Value::Int(i) if negate => Ok(i
            .checked_neg()
            .map(Value::Int)
            .unwrap_or(Value::Float(-(*i as f64)))),
        Value::Float(x) if negate => Ok(Value::Float(-x)),
        Value::Bool(b) if negate => Ok(Value::Int(-i64::from(*b))),
        Value::Int(_) | Value::Float(_) => Ok(operand.clone()),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Series(series) if series.values.is_numeric() => {
            let mut results = Vec::with_capacity(series.len());
            for row in 0..series.len() {
                results.push(unary(op, &series.values.get(row))?);
            }
            Ok(series.with_values(Column::from_values(&results)?).into())
        }
        other => Err(ScriptError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if negate { "-" } else { "+" },
            other.type_name()
        ))),
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> ScriptResult<bool> {
    match container {
        Value::List(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Str(text) => match item {
            Value::Str(needle) => Ok(text.contains(needle.as_str())),
            other => Err(ScriptError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Series(series) => Ok(series.values.values().iter().any(|v| v.py_eq(item))),
        Value::Frame(frame) => Ok(matches!(item, Value::Str(name) if frame.has_column(name))),
        other => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn series_with_series(op: BinaryOp, a: &Series, b: &Series) -> ScriptResult<Value> {
    if a.len() != b.len() {
        return Err(ScriptError::ValueError(
            "Can only compare identically-labeled Series objects".to_string(),
        ));
    }
    let mut results = Vec::with_capacity(a.len());
    for row in 0..a.len() {
        let missing = a.values.is_missing(row) || b.values.is_missing(row);
        results.push(element(op, &a.values.get(row), &b.values.get(row), missing)?);
    }
    let mut result = a.with_values(Column::from_values(&results)?);
    if a.name != b.name {
        result.name = None;
    }
    Ok(result.into())
}

fn series_with_scalar(
    op: BinaryOp,
    series: &Series,
    scalar: &Value,
    reflected: bool,
) -> ScriptResult<Value> {
    if matches!(scalar, Value::Frame(_) | Value::List(_)) {
        return Err(ScriptError::type_error(format!(
            "unsupported operand type(s) for {}: 'Series' and '{}'",
            op.symbol(),
            scalar.type_name()
        )));
    }
    let mut results = Vec::with_capacity(series.len());
    for row in 0..series.len() {
        let cell = series.values.get(row);
        let missing = series.values.is_missing(row) || scalar.is_missing();
        let value = if reflected {
            element(op, scalar, &cell, missing)?
        } else {
            element(op, &cell, scalar, missing)?
        };
        results.push(value);
    }
    Ok(series.with_values(Column::from_values(&results)?).into())
}

/// One element of a broadcast operation: missing operands propagate and
/// division by zero follows IEEE rules instead of raising
fn element(op: BinaryOp, left: &Value, right: &Value, missing: bool) -> ScriptResult<Value> {
    if missing {
        return Ok(match op {
            BinaryOp::Ne => Value::Bool(true),
            _ if op.is_comparison() => Value::Bool(false),
            BinaryOp::BitAnd | BinaryOp::BitOr => Value::Bool(false),
            _ => Value::None,
        });
    }
    if matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
        if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
            if b != 0.0 {
                return scalar(op, left, right);
            }
            return Ok(Value::Float(match op {
                BinaryOp::Div => a / 0.0,
                BinaryOp::FloorDiv => (a / 0.0).floor(),
                _ => f64::NAN,
            }));
        }
    }
    scalar(op, left, right)
}

fn scalar(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    use BinaryOp::*;

    match op {
        Eq => Ok(Value::Bool(left.py_eq(right))),
        Ne => Ok(Value::Bool(!left.py_eq(right))),
        Lt | Le | Gt | Ge => compare(op, left, right),
        In | NotIn => binary(op, left, right),
        BitAnd | BitOr => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BitAnd {
                *a && *b
            } else {
                *a || *b
            })),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(if op == BitAnd { a & b } else { a | b })),
            _ => Err(unsupported(op, left, right)),
        },
        Add => match (left, right) {
            (Value::Str(a), Value::Str(b)) => {
                check_len(a.len().saturating_add(b.len()))?;
                Ok(Value::Str(format!("{}{}", a, b)))
            }
            (Value::List(a), Value::List(b)) => {
                check_len(weight(a).saturating_add(weight(b)))?;
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            _ => arithmetic(op, left, right),
        },
        Mul => match (left, right) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let count = repeat_count(s.len(), *n)?;
                Ok(Value::Str(s.repeat(count)))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let count = repeat_count(weight(items), *n)?;
                let mut repeated = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    repeated.extend(items.iter().cloned());
                }
                Ok(Value::List(repeated))
            }
            _ => arithmetic(op, left, right),
        },
        Sub | Div | FloorDiv | Mod | Pow => arithmetic(op, left, right),
    }
}

/// Longest string (bytes) or list (items) an operation may build
pub(crate) const MAX_SEQUENCE_LEN: usize = 100_000_000;

/// Fail with `MemoryError` when a sequence of `len` would exceed the cap
pub(crate) fn check_len(len: usize) -> ScriptResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(ScriptError::MemoryError(format!(
            "cannot build a sequence of {} elements (limit {})",
            len, MAX_SEQUENCE_LEN
        )));
    }
    Ok(())
}

/// Size of a list counting string bytes, since repeating it clones them
fn weight(items: &[Value]) -> usize {
    items.iter().fold(0usize, |sum, item| {
        sum.saturating_add(match item {
            Value::Str(s) => s.len().max(1),
            Value::List(inner) => weight(inner).max(1),
            _ => 1,
        })
    })
}

/// Repetition count for `seq * n`; an empty sequence repeats zero times
fn repeat_count(unit: usize, n: i64) -> ScriptResult<usize> {
    if unit == 0 || n <= 0 {
        return Ok(0);
    }
    let count = usize::try_from(n).unwrap_or(usize::MAX);
    check_len(unit.saturating_mul(count))?;
    Ok(count)
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    let nan = |v: &Value| matches!(v, Value::Float(x) if x.is_nan());
    if (nan(left) || nan(right)) && left.as_f64().is_some() && right.as_f64().is_some() {
        return Ok(Value::Bool(false));
    }
    let ordering = left.py_cmp(right).ok_or_else(|| {
        ScriptError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    })?;
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return integer(op, a, b);
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => float(op, a, b),
        _ => Err(unsupported(op, left, right)),
    }
}

fn integer(op: BinaryOp, a: i64, b: i64) -> ScriptResult<Value> {
    let widen = |checked: Option<i64>, fallback: f64| {
        checked.map(Value::Int).unwrap_or(Value::Float(fallback))
    };
    let (x, y) = (a as f64, b as f64);
    Ok(match op {
        BinaryOp::Add => widen(a.checked_add(b), x + y),
        BinaryOp::Sub => widen(a.checked_sub(b), x - y),
        BinaryOp::Mul => widen(a.checked_mul(b), x * y),
        BinaryOp::Div => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision("division by zero".to_string()));
            }
            Value::Float(x / y)
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision(
                    "integer division or modulo by zero".to_string(),
                ));
            }
            let quotient = a.wrapping_div(b);
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Value::Int(quotient - 1)
            } else {
                Value::Int(quotient)
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision(
                    "integer modulo by zero".to_string(),
                ));
            }
            let remainder = a.wrapping_rem(b);
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                Value::Int(remainder + b)
            } else {
                Value::Int(remainder)
            }
        }
        BinaryOp::Pow => {
            if b < 0 {
                return float(op, x, y);
            }
            let checked = u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp));
            widen(checked, x.powf(y))
        }
        _ => return float(op, x, y),
    })
}

fn float(op: BinaryOp, a: f64, b: f64) -> ScriptResult<Value> {
    let zero = |message: &str| Err(ScriptError::ZeroDivision(message.to_string()));
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return zero("float division by zero");
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return zero("float floor division by zero");
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return zero("float modulo");
            }
            let remainder = a % b;
            if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                remainder + b
            } else {
                remainder
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return zero("0.0 cannot be raised to a negative power");
            }
            a.powf(b)
        }
        _ => {
            return Err(ScriptError::type_error(format!(
                "unsupported operand type(s) for {}: 'float' and 'float'",
                op.symbol()
            )))
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_division_by_zero_messages() {
        let err = binary(BinaryOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
        assert_eq!(err.kind(), "ZeroDivisionError");

        let err = binary(BinaryOp::Div, &Value::Float(1.0), &int(0)).unwrap_err();
        assert_eq!(err.to_string(), "float division by zero");

        let err = binary(BinaryOp::Mod, &int(5), &int(0)).unwrap_err();
        assert_eq!(err.to_string(), "integer modulo by zero");
    }

    #[test]
    fn test_huge_repetition_is_memory_error() {
        let err = binary(BinaryOp::Mul, &Value::Str("x".into()), &int(10_i64.pow(15))).unwrap_err();
        assert_eq!(err.kind(), "MemoryError");

        let list = Value::List(vec![int(0)]);
        let err = binary(BinaryOp::Mul, &list, &int(10_i64.pow(12))).unwrap_err();
        assert_eq!(err.kind(), "MemoryError");

        let err = binary(BinaryOp::Mul, &int(i64::MAX), &Value::Str("ab".into())).unwrap_err();
        assert_eq!(err.kind(), "MemoryError");

        // repeating a list clones its strings, so their bytes count too
        let wide = Value::List(vec![Value::Str("x".repeat(1_000))]);
        let err = binary(BinaryOp::Mul, &wide, &int(1_000_000)).unwrap_err();
        assert_eq!(err.kind(), "MemoryError");
    }

    #[test]
    fn test_small_and_empty_repetition() {
        assert_eq!(
            binary(BinaryOp::Mul, &Value::Str("ab".into()), &int(3)).unwrap(),
            Value::Str("ababab".into())
        );
        assert_eq!(
            binary(BinaryOp::Mul, &Value::List(vec![]), &int(10_i64.pow(12))).unwrap(),
            Value::List(vec![])
        );
        assert_eq!(
            binary(BinaryOp::Mul, &Value::Str("ab".into()), &int(-2)).unwrap(),
            Value::Str(String::new())
        );
    }

    #[test]
    fn test_floor_semantics() {
        assert_eq!(binary(BinaryOp::FloorDiv, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(binary(BinaryOp::Mod, &int(-7), &int(2)).unwrap(), int(1));
        assert_eq!(binary(BinaryOp::Div, &int(7), &int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(binary(BinaryOp::Pow, &int(2), &int(10)).unwrap(), int(1024));
    }

    #[test]
    fn test_mixed_types_raise_type_error() {
        let err = binary(BinaryOp::Add, &int(1), &Value::Str("a".into())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
        let err = binary(BinaryOp::Lt, &int(1), &Value::Str("a".into())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn test_series_broadcast() {
        let series = Series::new(
            Some("x".into()),
            Column::Int(vec![Some(1), Some(2), Some(3)]),
        );
        let doubled = binary(BinaryOp::Mul, &series.clone().into(), &int(2)).unwrap();
        let Value::Series(doubled) = doubled else {
            panic!("expected series");
        };
        assert_eq!(doubled.values, Column::Int(vec![Some(2), Some(4), Some(6)]));

        let mask = binary(BinaryOp::Gt, &series.clone().into(), &int(1)).unwrap();
        let Value::Series(mask) = mask else {
            panic!("expected series");
        };
        assert_eq!(mask.values, Column::Bool(vec![Some(false), Some(true), Some(true)]));

        // element-wise division by zero does not raise
        let divided = binary(BinaryOp::Div, &series.into(), &int(0)).unwrap();
        let Value::Series(divided) = divided else {
            panic!("expected series");
        };
        assert_eq!(divided.values.get(0), Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_membership() {
        let list = Value::List(vec![int(1), Value::Str("a".into())]);
        assert_eq!(binary(BinaryOp::In, &int(1), &list).unwrap(), Value::Bool(true));
        assert_eq!(
            binary(BinaryOp::NotIn, &Value::Str("b".into()), &list).unwrap(),
            Value::Bool(true)
        );
        assert!(binary(BinaryOp::In, &int(1), &int(2)).is_err());
    }
}
