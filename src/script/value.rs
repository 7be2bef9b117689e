//! Runtime values of analysis scripts.
//!
//! Only plain data (scalars, lists, series, frames) is serializable; charts,
//! group-by handles and callables deliberately fail serialization so they are
//! replaced by their string form when a session namespace is persisted.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::error::{ScriptError, ScriptResult};
use super::frame::{DataFrame, GroupBy, Series};
use crate::domain::ChartSpec;

/// Built-in callables and objects seeded into every execution scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Round,
    Sum,
    Min,
    Max,
    Abs,
    Str,
    Int,
    Float,
    Bool,
    List,
    Sorted,
    Range,
    Slice,
    /// `plotly_figures`: charts appended here are captured
    FigureSink,
}

impl Builtin {
    pub const ALL: [Builtin; 16] = [
        Self::Print,
        Self::Len,
        Self::Round,
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Abs,
        Self::Str,
        Self::Int,
        Self::Float,
        Self::Bool,
        Self::List,
        Self::Sorted,
        Self::Range,
        Self::Slice,
        Self::FigureSink,
    ];

    /// The name this builtin is bound to in the scope
    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Len => "len",
            Self::Round => "round",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Abs => "abs",
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Sorted => "sorted",
            Self::Range => "range",
            Self::Slice => "slice",
            Self::FigureSink => "plotly_figures",
        }
    }
}

/// Modules available without import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    /// Chart constructors, bound as `px`
    PlotlyExpress,
}

impl Module {
    pub fn name(self) -> &'static str {
        match self {
            Self::PlotlyExpress => "plotly.express",
        }
    }
}

/// A value held in a script scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Series(Series),
    Frame(DataFrame),
    #[serde(skip)]
    Chart(ChartSpec),
    #[serde(skip)]
    GroupBy(GroupBy),
    #[serde(skip)]
    Slice(Option<i64>, Option<i64>),
    #[serde(skip)]
    Builtin(Builtin),
    #[serde(skip)]
    Module(Module),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Series(_) => "Series",
            Self::Frame(_) => "DataFrame",
            Self::Chart(_) => "Figure",
            Self::GroupBy(_) => "DataFrameGroupBy",
            Self::Slice(..) => "slice",
            Self::Builtin(Builtin::FigureSink) => "list",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::Module(_) => "module",
        }
    }

    pub fn truthy(&self) -> ScriptResult<bool> {
        Ok(match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Series(_) | Self::Frame(_) => {
                return Err(ScriptError::ValueError(format!(
                    "The truth value of a {} is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all().",
                    self.type_name()
                )))
            }
            _ => true,
        })
    }

    /// Numeric view of scalars (bools count as 0/1)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// `None` and NaN are both "missing" in table columns
    pub fn is_missing(&self) -> bool {
        match self {
            Self::None => true,
            Self::Float(x) => x.is_nan(),
            _ => false,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Scalar as chart data
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::None => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(x) => serde_json::Number::from_f64(*x)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Str(s) => JsonValue::String(s.clone()),
            Self::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            other => JsonValue::String(other.to_string()),
        }
    }

    /// Equality with numeric promotion (`1 == 1.0`, `True == 1`)
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Self::Int(a), Self::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }

    /// Ordering for comparisons, `sorted`, `min` and `max`
    pub fn py_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.py_cmp(y)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// `repr()` of the value: strings are quoted, everything else displays as-is
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => quote(s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", fmt_float(*x)),
            Self::Str(s) => write!(f, "{}", s),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", inner.join(", "))
            }
            Self::Series(series) => write!(f, "{}", series),
            Self::Frame(frame) => write!(f, "{}", frame),
            Self::Chart(chart) => match &chart.title {
                Some(title) => write!(f, "Figure({} chart: {})", chart.kind.as_str(), title),
                None => write!(f, "Figure({} chart)", chart.kind.as_str()),
            },
            Self::GroupBy(_) => write!(f, "<DataFrameGroupBy object>"),
            Self::Slice(start, end) => {
                let bound = |b: &Option<i64>| b.map(|v| v.to_string()).unwrap_or("None".into());
                write!(f, "slice({}, {}, None)", bound(start), bound(end))
            }
            Self::Builtin(Builtin::FigureSink) => write!(f, "[]"),
            Self::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name()),
            Self::Module(module) => write!(f, "<module '{}'>", module.name()),
        }
    }
}

impl From<Series> for Value {
    fn from(series: Series) -> Self {
        Self::Series(series)
    }
}

impl From<DataFrame> for Value {
    fn from(frame: DataFrame) -> Self {
        Self::Frame(frame)
    }
}

fn quote(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\t', "\\t");
    if s.contains('\'') && !s.contains('"') {
        format!("\"{}\"", escaped)
    } else {
        format!("'{}'", escaped.replace('\'', "\\'"))
    }
}

/// Render a float the way Python's `repr` does (`3.0`, `0.1`, `1e-07`)
pub fn fmt_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        return python_exponent(&format!("{:e}", x));
    }
    if x.fract() == 0.0 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

/// Rust writes `1e20` and `1.5e-7`; Python writes `1e+20` and `1.5e-07`
pub(crate) fn python_exponent(raw: &str) -> String {
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => raw.to_string(),
    }
}

/// Round half to even at `digits` decimal places
pub fn round_to(x: f64, digits: i32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let factor = 10f64.powi(digits);
    let scaled = x * factor;
    let rounded = if (scaled - scaled.trunc()).abs() == 0.5 {
        2.0 * (scaled / 2.0).round()
    } else {
        scaled.round()
    };
    rounded / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_display() {
        assert_eq!(fmt_float(3.0), "3.0");
        assert_eq!(fmt_float(2.5), "2.5");
        assert_eq!(fmt_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(fmt_float(1e20), "1e+20");
        assert_eq!(fmt_float(1.5e-7), "1.5e-07");
        assert_eq!(fmt_float(f64::NAN), "nan");
        assert_eq!(fmt_float(-0.0), "-0.0");
    }

    #[test]
    fn test_list_display_quotes_strings() {
        let list = Value::List(vec![Value::Int(1), Value::Str("a".into()), Value::None]);
        assert_eq!(list.to_string(), "[1, 'a', None]");
        assert_eq!(Value::Str("it's".into()).repr(), "\"it's\"");
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(1.2345, 2), 1.23);
    }

    #[test]
    fn test_numeric_equality_and_ordering() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Str("1".into()).py_eq(&Value::Int(1)));
        assert_eq!(
            Value::Int(2).py_cmp(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(2).py_cmp(&Value::Str("a".into())), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::List(vec![]).truthy().unwrap());
        assert!(Value::Str("x".into()).truthy().unwrap());
        let frame = Value::Frame(DataFrame::default());
        assert!(frame.truthy().is_err());
    }

    #[test]
    fn test_opaque_values_do_not_serialize() {
        assert!(serde_json::to_string(&Value::Builtin(Builtin::Print)).is_err());
        assert!(serde_json::to_string(&Value::Int(3)).is_ok());
    }
}
