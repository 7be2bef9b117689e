//! Builtin functions, methods, attribute access and subscripting.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use super::ast::BinaryOp;
use super::error::{ScriptError, ScriptResult};
use super::frame::{Agg, Column, DataFrame, Index, Selection, Series};
use super::ops;
use super::value::{python_exponent, round_to, Builtin, Module, Value};
use crate::domain::{ChartKind, ChartSpec, Trace};

/// Longest list `range()` will materialise
const MAX_RANGE_LEN: i64 = 10_000_000;

/// Number of elements in `range(start, stop, step)`; negative when empty
fn range_len(start: i64, stop: i64, step: i64) -> i128 {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    if step > 0 {
        (stop - start + step - 1).div_euclid(step)
    } else {
        (start - stop - step - 1).div_euclid(-step)
    }
}

/// Side effects of a run: printed text and explicitly captured charts
#[derive(Debug, Default)]
pub struct Effects {
    pub stdout: String,
    pub charts: Vec<ChartSpec>,
}

/// The names every scope starts with
pub fn scope() -> BTreeMap<String, Value> {
    let mut scope: BTreeMap<String, Value> = Builtin::ALL
        .iter()
        .map(|builtin| (builtin.name().to_string(), Value::Builtin(*builtin)))
        .collect();
    scope.insert("px".to_string(), Value::Module(Module::PlotlyExpress));
    scope
}

/// Call arguments with positional-or-keyword lookup
struct Args<'a> {
    callee: &'a str,
    positional: &'a [Value],
    keywords: &'a [(String, Value)],
}

impl<'a> Args<'a> {
    fn new(callee: &'a str, positional: &'a [Value], keywords: &'a [(String, Value)]) -> Self {
        Self {
            callee,
            positional,
            keywords,
        }
    }

    fn get(&self, position: usize, keyword: &str) -> Option<&'a Value> {
        self.keywords
            .iter()
            .find(|(name, _)| name == keyword)
            .map(|(_, value)| value)
            .or_else(|| self.positional.get(position))
    }

    fn keyword(&self, keyword: &str) -> Option<&'a Value> {
        self.keywords
            .iter()
            .find(|(name, _)| name == keyword)
            .map(|(_, value)| value)
    }

    fn required(&self, position: usize, keyword: &str) -> ScriptResult<&'a Value> {
        self.get(position, keyword).ok_or_else(|| {
            ScriptError::type_error(format!(
                "{}() missing required argument: '{}'",
                self.callee, keyword
            ))
        })
    }

    fn int_or(&self, position: usize, keyword: &str, default: i64) -> ScriptResult<i64> {
        match self.get(position, keyword) {
            None | Some(Value::None) => Ok(default),
            Some(value) => value.as_int().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "'{}' must be an integer, not '{}'",
                    keyword,
                    value.type_name()
                ))
            }),
        }
    }

    fn flag(&self, keyword: &str, default: bool) -> ScriptResult<bool> {
        match self.keyword(keyword) {
            None => Ok(default),
            Some(value) => value.truthy(),
        }
    }

    /// A column name or list of column names
    fn names(&self, position: usize, keyword: &str) -> ScriptResult<Option<Vec<String>>> {
        match self.get(position, keyword) {
            None | Some(Value::None) => Ok(None),
            Some(value) => column_names(value).map(Some),
        }
    }
}

fn column_names(value: &Value) -> ScriptResult<Vec<String>> {
    match value {
        Value::Str(name) => Ok(vec![name.clone()]),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Str(name) => Ok(name.clone()),
                other => Err(ScriptError::KeyError(other.to_string())),
            })
            .collect(),
        other => Err(ScriptError::KeyError(other.to_string())),
    }
}

fn non_negative(n: i64) -> usize {
    n.max(0) as usize
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

pub fn call_function(
    fx: &mut Effects,
    builtin: Builtin,
    positional: &[Value],
    keywords: &[(String, Value)],
) -> ScriptResult<Value> {
    let args = Args::new(builtin.name(), positional, keywords);
    match builtin {
        Builtin::Print => {
            let sep = match args.keyword("sep") {
                Some(Value::None) | None => " ".to_string(),
                Some(value) => value.to_string(),
            };
            let end = match args.keyword("end") {
                Some(Value::None) | None => "\n".to_string(),
                Some(value) => value.to_string(),
            };
            let line: Vec<String> = positional.iter().map(Value::to_string).collect();
            fx.stdout.push_str(&line.join(&sep));
            fx.stdout.push_str(&end);
            Ok(Value::None)
        }
        Builtin::Len => {
            let value = args.required(0, "obj")?;
            let length = match value {
                Value::List(items) => items.len(),
                Value::Str(text) => text.chars().count(),
                Value::Series(series) => series.len(),
                Value::Frame(frame) => frame.rows(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(length as i64))
        }
        Builtin::Round => {
            let value = args.required(0, "number")?;
            let digits = match args.get(1, "ndigits") {
                None | Some(Value::None) => None,
                Some(d) => Some(d.as_int().ok_or_else(|| {
                    ScriptError::type_error("'ndigits' must be an integer")
                })?),
            };
            round_value(value, digits)
        }
        Builtin::Sum => {
            let iterable = args.required(0, "iterable")?;
            if let Value::Series(series) = iterable {
                return series.aggregate(Agg::Sum);
            }
            let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
            for item in iterate(iterable)? {
                total = ops::binary(BinaryOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Min | Builtin::Max => {
            let largest = builtin == Builtin::Max;
            if let [Value::Series(series)] = positional {
                return series.aggregate(if largest { Agg::Max } else { Agg::Min });
            }
            let items = match positional {
                [single] => iterate(single)?,
                many => many.to_vec(),
            };
            extreme(builtin.name(), items, largest)
        }
        Builtin::Abs => {
            let value = args.required(0, "x")?;
            abs_value(value)
        }
        Builtin::Str => Ok(Value::Str(
            args.get(0, "object").map(Value::to_string).unwrap_or_default(),
        )),
        Builtin::Int => match args.get(0, "x") {
            None => Ok(Value::Int(0)),
            Some(value) => to_int(value),
        },
        Builtin::Float => match args.get(0, "x") {
            None => Ok(Value::Float(0.0)),
            Some(value) => to_float(value),
        },
        Builtin::Bool => match args.get(0, "x") {
            None => Ok(Value::Bool(false)),
            Some(value) => Ok(Value::Bool(value.truthy()?)),
        },
        Builtin::List => match args.get(0, "iterable") {
            None => Ok(Value::List(Vec::new())),
            Some(value) => Ok(Value::List(iterate(value)?)),
        },
        Builtin::Sorted => {
            let mut items = iterate(args.required(0, "iterable")?)?;
            sort_values(&mut items)?;
            if args.flag("reverse", false)? {
                items.reverse();
            }
            Ok(Value::List(items))
        }
        Builtin::Range => {
            let bound = |value: &Value| {
                value.as_int().ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        value.type_name()
                    ))
                })
            };
            let (start, stop, step) = match positional {
                [stop] => (0, bound(stop)?, 1),
                [start, stop] => (bound(start)?, bound(stop)?, 1),
                [start, stop, step] => (bound(start)?, bound(stop)?, bound(step)?),
                _ => {
                    return Err(ScriptError::type_error(format!(
                        "range expected 1 to 3 arguments, got {}",
                        positional.len()
                    )))
                }
            };
            if step == 0 {
                return Err(ScriptError::ValueError(
                    "range() arg 3 must not be zero".to_string(),
                ));
            }
            let span = range_len(start, stop, step);
            if span > i128::from(MAX_RANGE_LEN) {
                return Err(ScriptError::ValueError(format!(
                    "range of {} elements is too large",
                    span
                )));
            }
            // span fits MAX_RANGE_LEN, so every element lies between start and stop
            let span = span.max(0) as i64;
            Ok(Value::List(
                (0..span).map(|i| Value::Int(start + i * step)).collect(),
            ))
        }
        Builtin::Slice => {
            let bound = |position: usize| match positional.get(position) {
                None | Some(Value::None) => Ok(None),
                Some(value) => value.as_int().map(Some).ok_or_else(|| {
                    ScriptError::type_error(
                        "slice indices must be integers or None".to_string(),
                    )
                }),
            };
            Ok(Value::Slice(bound(0)?, bound(1)?))
        }
        Builtin::FigureSink => Err(ScriptError::type_error("'list' object is not callable")),
    }
}

fn round_value(value: &Value, digits: Option<i64>) -> ScriptResult<Value> {
    match (value, digits) {
        (Value::Int(_), _) | (Value::Bool(_), _) => Ok(Value::Int(value.as_int().unwrap_or(0))),
        (Value::Float(x), None) => {
            if !x.is_finite() {
                return Err(ScriptError::ValueError(format!(
                    "cannot convert float {} to integer",
                    value
                )));
            }
            Ok(Value::Int(round_to(*x, 0) as i64))
        }
        (Value::Float(x), Some(d)) => Ok(Value::Float(round_to(*x, d as i32))),
        (Value::Series(series), d) => {
            Ok(series.with_values(series.values.round(d.unwrap_or(0) as i32)).into())
        }
        (other, _) => Err(ScriptError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn abs_value(value: &Value) -> ScriptResult<Value> {
    match value {
        Value::Int(i) => Ok(i
            .checked_abs()
            .map(Value::Int)
            .unwrap_or(Value::Float((*i as f64).abs()))),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        Value::Series(series) if series.values.is_numeric() => {
            let mut results = Vec::with_capacity(series.len());
            for value in series.values.values() {
                results.push(if value.is_missing() {
                    Value::None
                } else {
                    abs_value(&value)?
                });
            }
            Ok(series.with_values(Column::from_values(&results)?).into())
        }
        other => Err(ScriptError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn to_int(value: &Value) -> ScriptResult<Value> {
    match value {
        Value::Int(_) | Value::Bool(_) => Ok(Value::Int(value.as_int().unwrap_or(0))),
        Value::Float(x) => {
            if !x.is_finite() {
                return Err(ScriptError::ValueError(format!(
                    "cannot convert float {} to integer",
                    value
                )));
            }
            Ok(Value::Int(x.trunc() as i64))
        }
        Value::Str(text) => text.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::ValueError(format!(
                "invalid literal for int() with base 10: {}",
                value.repr()
            ))
        }),
        other => Err(ScriptError::type_error(format!(
            "int() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> ScriptResult<Value> {
    match value {
        Value::Str(text) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ScriptError::ValueError(format!(
                "could not convert string to float: {}",
                value.repr()
            ))
        }),
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            ScriptError::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn sort_values(items: &mut [Value]) -> ScriptResult<()> {
    let mut failure = None;
    items.sort_by(|a, b| {
        a.py_cmp(b).unwrap_or_else(|| {
            if failure.is_none() {
                failure = Some(ScriptError::type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                )));
            }
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn extreme(name: &str, items: Vec<Value>, largest: bool) -> ScriptResult<Value> {
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                let ordering = item.py_cmp(&current).ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        if largest { ">" } else { "<" },
                        item.type_name(),
                        current.type_name()
                    ))
                })?;
                let better = if largest {
                    ordering == Ordering::Greater
                } else {
                    ordering == Ordering::Less
                };
                if better {
                    item
                } else {
                    current
                }
            }
        });
    }
    best.ok_or_else(|| ScriptError::ValueError(format!("{}() arg is an empty sequence", name)))
}

/// Values a `for` loop or comprehension walks over
pub fn iterate(value: &Value) -> ScriptResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Str(text) => Ok(text.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Series(series) => Ok(series.values.values()),
        Value::Frame(frame) => Ok(frame.names().iter().cloned().map(Value::Str).collect()),
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Call `receiver.name(...)`. Mutating methods (`list.append`,
/// `fig.update_layout`) change `receiver` in place.
pub fn call_method(
    fx: &mut Effects,
    receiver: &mut Value,
    name: &str,
    positional: &[Value],
    keywords: &[(String, Value)],
) -> ScriptResult<Value> {
    let args = Args::new(name, positional, keywords);
    match receiver {
        Value::Module(Module::PlotlyExpress) => chart_constructor(name, &args),
        Value::Builtin(Builtin::FigureSink) => match name {
            "append" => {
                capture(fx, args.required(0, "object")?)?;
                Ok(Value::None)
            }
            "extend" => {
                for item in iterate(args.required(0, "iterable")?)? {
                    capture(fx, &item)?;
                }
                Ok(Value::None)
            }
            _ => Err(ScriptError::no_attribute("list", name)),
        },
        Value::Chart(chart) => chart_method(fx, chart, name, &args),
        Value::List(items) => list_method(items, name, &args),
        Value::Str(text) => str_method(text, name, &args),
        Value::Series(series) => series_method(series, name, &args),
        Value::Frame(frame) => frame_method(frame, name, &args),
        Value::GroupBy(groups) => match Agg::from_method(name) {
            Some(agg) => groups.aggregate(agg),
            None => Err(ScriptError::no_attribute("DataFrameGroupBy", name)),
        },
        other => Err(ScriptError::no_attribute(other.type_name(), name)),
    }
}

fn capture(fx: &mut Effects, value: &Value) -> ScriptResult<()> {
    match value {
        Value::Chart(chart) => {
            fx.charts.push(chart.clone());
            Ok(())
        }
        other => Err(ScriptError::type_error(format!(
            "plotly_figures only accepts figures, got '{}'",
            other.type_name()
        ))),
    }
}

fn chart_method(
    fx: &mut Effects,
    chart: &mut ChartSpec,
    name: &str,
    args: &Args<'_>,
) -> ScriptResult<Value> {
    match name {
        "show" => {
            fx.charts.push(chart.clone());
            Ok(Value::None)
        }
        "update_layout" => {
            if let Some(title) = args.keyword("title") {
                chart.title = Some(title.to_string());
            }
            if let Some(label) = args.keyword("xaxis_title") {
                chart.x_label = Some(label.to_string());
            }
            if let Some(label) = args.keyword("yaxis_title") {
                chart.y_label = Some(label.to_string());
            }
            Ok(Value::Chart(chart.clone()))
        }
        "update_traces" | "update_xaxes" | "update_yaxes" => Ok(Value::Chart(chart.clone())),
        _ => Err(ScriptError::no_attribute("Figure", name)),
    }
}

fn list_method(items: &mut Vec<Value>, name: &str, args: &Args<'_>) -> ScriptResult<Value> {
    match name {
        "append" => {
            items.push(args.required(0, "object")?.clone());
            Ok(Value::None)
        }
        "extend" => {
            items.extend(iterate(args.required(0, "iterable")?)?);
            Ok(Value::None)
        }
        "pop" => {
            let len = items.len() as i64;
            let position = args.int_or(0, "index", -1)?;
            let position = if position < 0 { position + len } else { position };
            if position < 0 || position >= len {
                return Err(ScriptError::IndexError("pop index out of range".to_string()));
            }
            Ok(items.remove(position as usize))
        }
        "count" => {
            let needle = args.required(0, "value")?;
            Ok(Value::Int(items.iter().filter(|v| v.py_eq(needle)).count() as i64))
        }
        "index" => {
            let needle = args.required(0, "value")?;
            items
                .iter()
                .position(|v| v.py_eq(needle))
                .map(|p| Value::Int(p as i64))
                .ok_or_else(|| ScriptError::ValueError(format!("{} is not in list", needle.repr())))
        }
        "copy" => Ok(Value::List(items.clone())),
        _ => Err(ScriptError::no_attribute("list", name)),
    }
}

fn str_method(text: &str, name: &str, args: &Args<'_>) -> ScriptResult<Value> {
    let string_arg = |position: usize, keyword: &str| -> ScriptResult<String> {
        match args.required(position, keyword)? {
            Value::Str(s) => Ok(s.clone()),
            other => Err(ScriptError::type_error(format!(
                "must be str, not {}",
                other.type_name()
            ))),
        }
    };
    Ok(match name {
        "upper" => Value::Str(text.to_uppercase()),
        "lower" => Value::Str(text.to_lowercase()),
        "strip" => Value::Str(text.trim().to_string()),
        "lstrip" => Value::Str(text.trim_start().to_string()),
        "rstrip" => Value::Str(text.trim_end().to_string()),
        "title" => Value::Str(title_case(text)),
        "replace" => Value::Str(text.replace(&string_arg(0, "old")?, &string_arg(1, "new")?)),
        "startswith" => Value::Bool(text.starts_with(&string_arg(0, "prefix")?)),
        "endswith" => Value::Bool(text.ends_with(&string_arg(0, "suffix")?)),
        "split" => {
            let parts: Vec<Value> = match args.get(0, "sep") {
                None | Some(Value::None) => text
                    .split_whitespace()
                    .map(|p| Value::Str(p.to_string()))
                    .collect(),
                Some(_) => text
                    .split(string_arg(0, "sep")?.as_str())
                    .map(|p| Value::Str(p.to_string()))
                    .collect(),
            };
            Value::List(parts)
        }
        "join" => {
            let pieces: Vec<String> = iterate(args.required(0, "iterable")?)?
                .into_iter()
                .map(|item| match item {
                    Value::Str(s) => Ok(s),
                    other => Err(ScriptError::type_error(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<ScriptResult<_>>()?;
            let total = pieces
                .iter()
                .fold(text.len().saturating_mul(pieces.len()), |sum, piece| {
                    sum.saturating_add(piece.len())
                });
            ops::check_len(total)?;
            Value::Str(pieces.join(text))
        }
        _ => return Err(ScriptError::no_attribute("str", name)),
    })
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut boundary = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}

fn missing_mask(column: &Column, present: bool) -> Column {
    Column::Bool(
        (0..column.len())
            .map(|row| Some(column.is_missing(row) != present))
            .collect(),
    )
}

fn fill_missing(column: &Column, fill: &Value) -> ScriptResult<Column> {
    let values: Vec<Value> = (0..column.len())
        .map(|row| {
            if column.is_missing(row) {
                fill.clone()
            } else {
                column.get(row)
            }
        })
        .collect();
    Column::from_values(&values)
}

fn series_method(series: &Series, name: &str, args: &Args<'_>) -> ScriptResult<Value> {
    if let Some(agg) = Agg::from_method(name) {
        return series.aggregate(agg);
    }
    let n = || args.int_or(0, "n", 5).map(non_negative);
    Ok(match name {
        "head" => series.head(n()?).into(),
        "tail" => series.tail(n()?).into(),
        "tolist" | "to_list" => Value::List(series.values.values()),
        "unique" => Value::List(series.unique()),
        "value_counts" => series.value_counts().into(),
        "sort_values" => series.sort_values(args.flag("ascending", true)?).into(),
        "round" => {
            let digits = args.int_or(0, "decimals", 0)?;
            series.with_values(series.values.round(digits as i32)).into()
        }
        "idxmax" => series.arg_extreme(true)?,
        "idxmin" => series.arg_extreme(false)?,
        "abs" => abs_value(&Value::Series(series.clone()))?,
        "cumsum" => series.cumsum()?.into(),
        "describe" => series.describe()?.into(),
        "reset_index" => series.reset_index()?.into(),
        "to_frame" => series.to_frame()?.into(),
        "copy" => series.clone().into(),
        "isnull" | "isna" => series.with_values(missing_mask(&series.values, false)).into(),
        "notnull" | "notna" => series.with_values(missing_mask(&series.values, true)).into(),
        "dropna" => {
            let rows: Vec<usize> = (0..series.len())
                .filter(|&r| !series.values.is_missing(r))
                .collect();
            series.take(&rows).into()
        }
        "fillna" => series
            .with_values(fill_missing(&series.values, args.required(0, "value")?)?)
            .into(),
        "any" | "all" => {
            let mut flags = Vec::with_capacity(series.len());
            for value in series.values.values() {
                if !value.is_missing() {
                    flags.push(value.truthy()?);
                }
            }
            Value::Bool(if name == "any" {
                flags.iter().any(|f| *f)
            } else {
                flags.iter().all(|f| *f)
            })
        }
        "astype" => {
            let converted = match args.required(0, "dtype")? {
                Value::Builtin(Builtin::Str) => Column::Text(
                    series
                        .values
                        .values()
                        .iter()
                        .map(|v| Some(v.to_string()))
                        .collect(),
                ),
                Value::Builtin(builtin @ (Builtin::Int | Builtin::Float)) => {
                    let mut converted = Vec::with_capacity(series.len());
                    for value in series.values.values() {
                        converted.push(if *builtin == Builtin::Int {
                            to_int(&value)?
                        } else {
                            to_float(&value)?
                        });
                    }
                    Column::from_values(&converted)?
                }
                other => {
                    return Err(ScriptError::type_error(format!(
                        "data type '{}' not understood",
                        other
                    )))
                }
            };
            series.with_values(converted).into()
        }
        _ => return Err(ScriptError::no_attribute("Series", name)),
    })
}

fn frame_method(frame: &DataFrame, name: &str, args: &Args<'_>) -> ScriptResult<Value> {
    if let Some(agg) = Agg::from_method(name) {
        return frame_aggregate(frame, agg);
    }
    let n = || args.int_or(0, "n", 5).map(non_negative);
    Ok(match name {
        "head" => frame.head(n()?).into(),
        "tail" => frame.tail(n()?).into(),
        "describe" => frame.describe()?.into(),
        "dropna" => frame.dropna().into(),
        "copy" => frame.clone().into(),
        "reset_index" => frame.reset_index()?.into(),
        "to_string" => Value::Str(frame.to_string()),
        "sort_values" => {
            let by = args
                .names(0, "by")?
                .ok_or_else(|| ScriptError::type_error("sort_values() missing required argument: 'by'"))?;
            frame.sort_values(&by, args.flag("ascending", true)?)?.into()
        }
        "groupby" => {
            let by = args
                .names(0, "by")?
                .ok_or_else(|| ScriptError::type_error("You have to supply one of 'by' and 'level'"))?;
            match by.as_slice() {
                [key] => Value::GroupBy(frame.groupby(key)?),
                _ => {
                    return Err(ScriptError::ValueError(
                        "grouping by more than one column is not supported".to_string(),
                    ))
                }
            }
        }
        "drop" => {
            let columns = args
                .names(0, "columns")?
                .ok_or_else(|| ScriptError::type_error("drop() missing required argument: 'columns'"))?;
            for column in &columns {
                frame.require(column)?;
            }
            let keep: Vec<String> = frame
                .names()
                .iter()
                .filter(|column| !columns.contains(column))
                .cloned()
                .collect();
            frame.select(&keep)?.into()
        }
        "isnull" | "isna" | "notnull" | "notna" => {
            let present = name.starts_with("not");
            let mut masks = Vec::with_capacity(frame.width());
            for column in frame.names() {
                masks.push((column.clone(), missing_mask(frame.require(column)?, present)));
            }
            DataFrame::new(masks)?.into()
        }
        "fillna" => {
            let fill = args.required(0, "value")?;
            let mut filled = frame.clone();
            for column in frame.names() {
                filled.set_column(column, fill_missing(frame.require(column)?, fill)?)?;
            }
            filled.into()
        }
        _ => return Err(ScriptError::no_attribute("DataFrame", name)),
    })
}

/// Column-wise reduction, labelled by column name
fn frame_aggregate(frame: &DataFrame, agg: Agg) -> ScriptResult<Value> {
    let numeric_only = matches!(agg, Agg::Mean | Agg::Median | Agg::Std | Agg::Var);
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for name in frame.names() {
        let column = frame.require(name)?;
        if numeric_only && matches!(column, Column::Text(_)) {
            continue;
        }
        labels.push(Some(name.clone()));
        values.push(Series::new(None, column.clone()).aggregate(agg)?);
    }
    Ok(Series::new(None, Column::from_values(&values)?)
        .with_index(Some(Index {
            name: None,
            labels: Column::Text(labels),
        }))
        .into())
}

// ---------------------------------------------------------------------------
// Attributes and subscripts
// ---------------------------------------------------------------------------

fn labels_of(index: Option<&Index>, rows: usize) -> Value {
    match index {
        Some(index) => Value::List(index.labels.values()),
        None => Value::List((0..rows as i64).map(Value::Int).collect()),
    }
}

pub fn attribute(value: &Value, name: &str) -> ScriptResult<Value> {
    match value {
        Value::Frame(frame) => Ok(match name {
            "columns" => Value::List(frame.names().iter().cloned().map(Value::Str).collect()),
            "shape" => Value::List(vec![
                Value::Int(frame.rows() as i64),
                Value::Int(frame.width() as i64),
            ]),
            "size" => Value::Int((frame.rows() * frame.width()) as i64),
            "empty" => Value::Bool(frame.rows() == 0 || frame.width() == 0),
            "dtypes" => {
                let mut dtypes = Vec::with_capacity(frame.width());
                for column in frame.names() {
                    dtypes.push(Some(frame.require(column)?.dtype().to_string()));
                }
                Series::new(None, Column::Text(dtypes))
                    .with_index(Some(Index {
                        name: None,
                        labels: Column::Text(frame.names().iter().cloned().map(Some).collect()),
                    }))
                    .into()
            }
            _ if frame.has_column(name) => frame.column(name)?.into(),
            _ => return Err(ScriptError::no_attribute("DataFrame", name)),
        }),
        Value::Series(series) => Ok(match name {
            "name" => series.name.clone().map(Value::Str).unwrap_or(Value::None),
            "shape" => Value::List(vec![Value::Int(series.len() as i64)]),
            "size" => Value::Int(series.len() as i64),
            "empty" => Value::Bool(series.is_empty()),
            "values" => Value::List(series.values.values()),
            "dtype" => Value::Str(series.values.dtype().to_string()),
            "index" => labels_of(series.index.as_ref(), series.len()),
            _ => return Err(ScriptError::no_attribute("Series", name)),
        }),
        Value::Chart(chart) => match name {
            "title" => Ok(chart.title.clone().map(Value::Str).unwrap_or(Value::None)),
            _ => Err(ScriptError::no_attribute("Figure", name)),
        },
        other => Err(ScriptError::no_attribute(other.type_name(), name)),
    }
}

/// Resolve a slice against a length (step 1, Python clamping rules)
fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let clamp = |bound: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(0, len)
    };
    let start = start.map(clamp).unwrap_or(0);
    let end = end.map(clamp).unwrap_or(len).max(start);
    (start as usize, end as usize)
}

fn position(len: usize, key: i64, what: &str) -> ScriptResult<usize> {
    let len = len as i64;
    let resolved = if key < 0 { key + len } else { key };
    if resolved < 0 || resolved >= len {
        return Err(ScriptError::IndexError(format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

pub fn index(value: &Value, key: &Value) -> ScriptResult<Value> {
    match (value, key) {
        (Value::Frame(frame), Value::Str(name)) => Ok(frame.column(name)?.into()),
        (Value::Frame(frame), Value::List(_)) => Ok(frame.select(&column_names(key)?)?.into()),
        (Value::Frame(frame), Value::Series(mask)) => Ok(frame.filter(&mask.values)?.into()),
        (Value::Frame(frame), Value::Slice(start, end)) => {
            let (start, end) = slice_bounds(frame.rows(), *start, *end);
            let rows: Vec<usize> = (start..end).collect();
            Ok(frame.take(&rows).into())
        }
        (Value::Series(series), Value::Series(mask)) => Ok(series.filter(&mask.values)?.into()),
        (Value::Series(series), Value::Slice(start, end)) => {
            let (start, end) = slice_bounds(series.len(), *start, *end);
            let rows: Vec<usize> = (start..end).collect();
            Ok(series.take(&rows).into())
        }
        (Value::Series(series), key) => series.item(key),
        (Value::List(items), Value::Slice(start, end)) => {
            let (start, end) = slice_bounds(items.len(), *start, *end);
            Ok(Value::List(items[start..end].to_vec()))
        }
        (Value::List(items), key) => match key.as_int() {
            Some(i) => Ok(items[position(items.len(), i, "list")?].clone()),
            None => Err(ScriptError::type_error(format!(
                "list indices must be integers or slices, not {}",
                key.type_name()
            ))),
        },
        (Value::Str(text), Value::Slice(start, end)) => {
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = slice_bounds(chars.len(), *start, *end);
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        (Value::Str(text), key) => match key.as_int() {
            Some(i) => {
                let chars: Vec<char> = text.chars().collect();
                Ok(Value::Str(chars[position(chars.len(), i, "string")?].to_string()))
            }
            None => Err(ScriptError::type_error(format!(
                "string indices must be integers, not '{}'",
                key.type_name()
            ))),
        },
        (Value::GroupBy(groups), Value::Str(name)) => {
            Ok(Value::GroupBy(groups.select(Selection::One(name.clone()))?))
        }
        (Value::GroupBy(groups), Value::List(_)) => Ok(Value::GroupBy(
            groups.select(Selection::Many(column_names(key)?))?,
        )),
        (other, _) => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[key] = value`
pub fn set_item(container: &mut Value, key: &Value, value: Value) -> ScriptResult<()> {
    match (container, key) {
        (Value::Frame(frame), Value::Str(name)) => {
            let column = match value {
                Value::Series(series) => series.values,
                Value::List(items) => Column::from_values(&items)?,
                Value::Frame(_) => {
                    return Err(ScriptError::ValueError(
                        "Cannot set a DataFrame to a single column".to_string(),
                    ))
                }
                scalar => Column::from_values(&vec![scalar; frame.rows()])?,
            };
            frame.set_column(name, column)
        }
        (Value::List(items), key) => {
            let i = key.as_int().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "list indices must be integers or slices, not {}",
                    key.type_name()
                ))
            })?;
            let slot = position(items.len(), i, "list assignment")?;
            items[slot] = value;
            Ok(())
        }
        (other, _) => Err(ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

/// Axis values and their label, from a column name, a series or a list
fn axis(
    frame: Option<&DataFrame>,
    value: &Value,
    callee: &str,
) -> ScriptResult<(Vec<JsonValue>, Option<String>)> {
    let column_json = |column: &Column| -> Vec<JsonValue> {
        (0..column.len()).map(|r| column.to_json(r)).collect()
    };
    match (value, frame) {
        (Value::Str(name), Some(frame)) => Ok((column_json(frame.require(name)?), Some(name.clone()))),
        (Value::Str(name), None) => Err(ScriptError::ValueError(format!(
            "{}() got column name '{}' but no data_frame",
            callee, name
        ))),
        (Value::Series(series), _) => Ok((column_json(&series.values), series.name.clone())),
        (Value::List(items), _) => Ok((items.iter().map(Value::to_json).collect(), None)),
        (other, _) => Err(ScriptError::type_error(format!(
            "{}() cannot plot a value of type '{}'",
            callee,
            other.type_name()
        ))),
    }
}

fn chart_constructor(name: &str, args: &Args<'_>) -> ScriptResult<Value> {
    let kind = match name {
        "bar" => ChartKind::Bar,
        "line" => ChartKind::Line,
        "scatter" => ChartKind::Scatter,
        "histogram" => ChartKind::Histogram,
        "pie" => ChartKind::Pie,
        _ => return Err(ScriptError::no_attribute("module", name)),
    };
    let frame = match args.get(0, "data_frame") {
        Some(Value::Frame(frame)) => Some(frame),
        None | Some(Value::None) => None,
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "data_frame must be a DataFrame, not '{}'",
                other.type_name()
            )))
        }
    };

    let mut chart = ChartSpec::new(kind);
    if let Some(title) = args.keyword("title") {
        chart.title = Some(title.to_string());
    }

    match kind {
        ChartKind::Pie => {
            let names = args.required(1, "names")?;
            let (labels, label_name) = axis(frame, names, name)?;
            let (labels, sizes) = match args.keyword("values") {
                Some(values) => (labels, axis(frame, values, name)?.0),
                None => {
                    // no values: slice sizes are occurrence counts
                    let labels = Column::from_values(
                        &labels.iter().map(json_scalar).collect::<Vec<_>>(),
                    )?;
                    let counts = Series::new(label_name.clone(), labels).value_counts();
                    let keys = counts.index.map(|index| index.labels).unwrap_or_default();
                    (
                        (0..keys.len()).map(|r| keys.to_json(r)).collect(),
                        (0..counts.values.len())
                            .map(|r| counts.values.to_json(r))
                            .collect(),
                    )
                }
            };
            chart.traces.push(Trace {
                name: None,
                x: labels,
                y: sizes,
            });
        }
        ChartKind::Histogram => {
            let x = args.required(1, "x")?;
            let (values, label) = axis(frame, x, name)?;
            chart.x_label = label;
            chart.traces.push(Trace {
                name: None,
                x: values,
                y: Vec::new(),
            });
        }
        ChartKind::Bar | ChartKind::Line | ChartKind::Scatter => {
            let y = args.required(2, "y")?;
            let y_series: Vec<(Vec<JsonValue>, Option<String>)> = match (y, frame) {
                (Value::List(items), Some(frame))
                    if items.iter().all(|i| matches!(i, Value::Str(_))) =>
                {
                    let mut traces = Vec::with_capacity(items.len());
                    for item in items {
                        traces.push(axis(Some(frame), item, name)?);
                    }
                    traces
                }
                _ => vec![axis(frame, y, name)?],
            };
            let (x_values, x_label) = match args.get(1, "x") {
                Some(x) if !matches!(x, Value::None) => axis(frame, x, name)?,
                _ => {
                    let rows = y_series.first().map(|(v, _)| v.len()).unwrap_or(0);
                    ((0..rows).map(JsonValue::from).collect(), None)
                }
            };
            chart.x_label = x_label;
            if y_series.len() == 1 {
                chart.y_label = y_series[0].1.clone();
            }
            let named = y_series.len() > 1;
            for (values, label) in y_series {
                chart.traces.push(Trace {
                    name: if named { label } else { None },
                    x: x_values.clone(),
                    y: values,
                });
            }
        }
    }
    Ok(Value::Chart(chart))
}

fn json_scalar(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::None,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::None),
        JsonValue::String(s) => Value::Str(s.clone()),
        other => Value::Str(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// f-string format specs
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    plus: bool,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> ScriptResult<FormatSpec> {
    let invalid = || ScriptError::ValueError("Invalid format specifier".to_string());
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = FormatSpec::default();
    let mut i = 0;

    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        parsed.fill = Some(chars[0]);
        parsed.align = Some(chars[1]);
        i = 2;
    } else if chars.first().is_some_and(|c| matches!(c, '<' | '>' | '^')) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if chars.get(i) == Some(&'+') {
        parsed.plus = true;
        i += 1;
    } else if chars.get(i) == Some(&'-') {
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        parsed.zero = true;
        i += 1;
    }
    let digits_end = (i..chars.len()).find(|&j| !chars[j].is_ascii_digit()).unwrap_or(chars.len());
    if digits_end > i {
        let digits: String = chars[i..digits_end].iter().collect();
        parsed.width = digits.parse().map_err(|_| invalid())?;
        i = digits_end;
    }
    if matches!(chars.get(i), Some(',') | Some('_')) {
        parsed.grouping = true;
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let end = (i..chars.len()).find(|&j| !chars[j].is_ascii_digit()).unwrap_or(chars.len());
        if end == i {
            return Err(invalid());
        }
        let digits: String = chars[i..end].iter().collect();
        parsed.precision = Some(digits.parse().map_err(|_| invalid())?);
        i = end;
    }
    match &chars[i..] {
        [] => {}
        [kind] => parsed.kind = Some(*kind),
        _ => return Err(invalid()),
    }
    if parsed.width > ops::MAX_SEQUENCE_LEN
        || parsed.precision.is_some_and(|p| p > ops::MAX_SEQUENCE_LEN)
    {
        return Err(ScriptError::ValueError(
            "Too many decimal digits in format string".to_string(),
        ));
    }
    Ok(parsed)
}

fn group_thousands(number: &str) -> String {
    let (sign, rest) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (integer, fraction) = match rest.find(|c: char| c == '.' || c == 'e') {
        Some(at) => rest.split_at(at),
        None => (rest, ""),
    };
    let mut grouped = String::new();
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}{}{}", sign, grouped, fraction)
}

/// `%g`-style: `precision` significant digits, trailing zeros trimmed
fn general(x: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if x == 0.0 || !x.is_finite() {
        return super::value::fmt_float(x);
    }
    let exponent = x.abs().log10().floor() as i32;
    let trim = |s: String| {
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        }
    };
    if exponent < -4 || exponent >= precision as i32 {
        let raw = format!("{:.*e}", precision - 1, x);
        let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
        python_exponent(&format!("{}e{}", trim(mantissa.to_string()), exp))
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim(format!("{:.*}", decimals, x))
    }
}

/// Render `value` with a format spec (`.2f`, `,`, `.1%`, `>10`, ...)
pub fn format_value(value: &Value, spec: &str) -> ScriptResult<String> {
    let spec = parse_spec(spec)?;
    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let unknown = |kind: char| {
        ScriptError::ValueError(format!(
            "Unknown format code '{}' for object of type '{}'",
            kind,
            value.type_name()
        ))
    };

    let mut body = match (spec.kind, value) {
        (Some('s'), Value::Str(s)) => s.clone(),
        (Some('s'), _) | (Some(_), Value::Str(_)) => {
            return Err(unknown(spec.kind.unwrap_or('s')))
        }
        (Some('d'), Value::Int(i)) => i.to_string(),
        (Some('d'), _) => return Err(unknown('d')),
        (Some(kind @ ('f' | 'F' | '%' | 'e' | 'E' | 'g' | 'G')), v) if numeric => {
            let x = v.as_f64().unwrap_or(f64::NAN);
            let precision = spec.precision.unwrap_or(6);
            match kind {
                'f' | 'F' => format!("{:.*}", precision, x),
                '%' => format!("{:.*}%", precision, x * 100.0),
                'e' | 'E' => python_exponent(&format!("{:.*e}", precision, x)),
                _ => general(x, precision),
            }
        }
        (Some(kind), _) => return Err(unknown(kind)),
        (None, Value::Float(x)) if spec.precision.is_some() => {
            general(*x, spec.precision.unwrap_or(6))
        }
        (None, v) => v.to_string(),
    };

    if spec.grouping && numeric {
        body = group_thousands(&body);
    }
    if spec.plus && numeric && !body.starts_with('-') {
        body.insert(0, '+');
    }

    let len = body.chars().count();
    if len >= spec.width {
        return Ok(body);
    }
    let padding = spec.width - len;
    if spec.zero && spec.align.is_none() && numeric {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+')) => (c.to_string(), body[1..].to_string()),
            _ => (String::new(), body.clone()),
        };
        return Ok(format!("{}{}{}", sign, "0".repeat(padding), digits));
    }
    let fill = spec.fill.unwrap_or(' ').to_string();
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '<' => format!("{}{}", body, fill.repeat(padding)),
        '^' => format!(
            "{}{}{}",
            fill.repeat(padding / 2),
            body,
            fill.repeat(padding - padding / 2)
        ),
        _ => format!("{}{}", fill.repeat(padding), body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(builtin: Builtin, args: &[Value]) -> ScriptResult<Value> {
        call_function(&mut Effects::default(), builtin, args, &[])
    }

    #[test]
    fn test_print_uses_sep_and_end() {
        let mut fx = Effects::default();
        call_function(
            &mut fx,
            Builtin::Print,
            &[Value::Int(1), Value::Str("a".into())],
            &[("sep".into(), Value::Str("-".into()))],
        )
        .unwrap();
        call_function(&mut fx, Builtin::Print, &[Value::Float(2.0)], &[]).unwrap();
        assert_eq!(fx.stdout, "1-a\n2.0\n");
    }

    #[test]
    fn test_range_extremes_are_value_errors() {
        let err = call(
            Builtin::Range,
            &[Value::Int(-(1 << 62)), Value::Int(1 << 62)],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ValueError");
        assert!(err.to_string().contains("too large"));

        assert_eq!(
            call(
                Builtin::Range,
                &[Value::Int(i64::MAX), Value::Int(i64::MIN), Value::Int(i64::MIN)]
            )
            .unwrap(),
            Value::List(vec![Value::Int(i64::MAX), Value::Int(-1)])
        );

        // empty ranges at the extremes stay empty
        assert_eq!(
            call(Builtin::Range, &[Value::Int(i64::MAX), Value::Int(i64::MIN)]).unwrap(),
            Value::List(vec![])
        );
        assert_eq!(
            call(
                Builtin::Range,
                &[Value::Int(i64::MAX - 2), Value::Int(i64::MAX), Value::Int(i64::MAX)]
            )
            .unwrap(),
            Value::List(vec![Value::Int(i64::MAX - 2)])
        );
    }

    #[test]
    fn test_numeric_builtins() {
        assert_eq!(call(Builtin::Round, &[Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(
            call(Builtin::Round, &[Value::Float(3.14159), Value::Int(2)]).unwrap(),
            Value::Float(3.14)
        );
        let list = Value::List(vec![Value::Int(3), Value::Float(1.5), Value::Int(2)]);
        assert_eq!(call(Builtin::Sum, &[list.clone()]).unwrap(), Value::Float(6.5));
        assert_eq!(call(Builtin::Max, &[list.clone()]).unwrap(), Value::Int(3));
        assert_eq!(
            call(Builtin::Min, &[Value::Int(4), Value::Int(-1)]).unwrap(),
            Value::Int(-1)
        );
        assert!(call(Builtin::Max, &[Value::List(vec![])]).is_err());
        assert_eq!(
            call(Builtin::Range, &[Value::Int(1), Value::Int(7), Value::Int(3)]).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(4)])
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call(Builtin::Int, &[Value::Str(" 42 ".into())]).unwrap(), Value::Int(42));
        assert_eq!(call(Builtin::Int, &[Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        let err = call(Builtin::Int, &[Value::Str("x".into())]).unwrap_err();
        assert_eq!(err.to_string(), "invalid literal for int() with base 10: 'x'");
        assert_eq!(
            call(Builtin::Float, &[Value::Str("1.5".into())]).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_format_specs() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Float(1234.5), ",.2f").unwrap(), "1,234.50");
        assert_eq!(format_value(&Value::Float(0.256), ".1%").unwrap(), "25.6%");
        assert_eq!(format_value(&Value::Int(7), "03d").unwrap(), "007");
        assert_eq!(format_value(&Value::Str("ab".into()), ">4").unwrap(), "  ab");
        assert_eq!(format_value(&Value::Float(3.14159), ".3").unwrap(), "3.14");
        assert!(format_value(&Value::Str("ab".into()), ".2f").is_err());
    }

    #[test]
    fn test_figure_sink_captures_only_charts() {
        let mut fx = Effects::default();
        let mut sink = Value::Builtin(Builtin::FigureSink);
        let chart = Value::Chart(ChartSpec::new(ChartKind::Line));
        call_method(&mut fx, &mut sink, "append", &[chart], &[]).unwrap();
        assert_eq!(fx.charts.len(), 1);
        assert!(call_method(&mut fx, &mut sink, "append", &[Value::Int(1)], &[]).is_err());
    }

    #[test]
    fn test_chart_from_frame_columns() {
        let frame = DataFrame::new(vec![
            (
                "region".into(),
                Column::Text(vec![Some("n".into()), Some("s".into())]),
            ),
            ("sales".into(), Column::Float(vec![Some(1.5), None])),
        ])
        .unwrap();
        let mut px = Value::Module(Module::PlotlyExpress);
        let chart = call_method(
            &mut Effects::default(),
            &mut px,
            "bar",
            &[Value::Frame(frame)],
            &[
                ("x".into(), Value::Str("region".into())),
                ("y".into(), Value::Str("sales".into())),
                ("title".into(), Value::Str("Sales".into())),
            ],
        )
        .unwrap();
        let Value::Chart(chart) = chart else {
            panic!("expected chart");
        };
        assert_eq!(chart.title.as_deref(), Some("Sales"));
        assert_eq!(chart.traces[0].x, vec![JsonValue::from("n"), JsonValue::from("s")]);
        assert_eq!(chart.traces[0].y, vec![JsonValue::from(1.5), JsonValue::Null]);
        assert_eq!(chart.y_label.as_deref(), Some("sales"));
    }

    #[test]
    fn test_list_and_string_indexing() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(index(&list, &Value::Int(-1)).unwrap(), Value::Int(3));
        assert_eq!(
            index(&list, &Value::Slice(Some(1), None)).unwrap(),
            Value::List(vec![Value::Int(2), Value::Int(3)])
        );
        let err = index(&list, &Value::Int(5)).unwrap_err();
        assert_eq!(err.to_string(), "list index out of range");
        assert_eq!(
            index(&Value::Str("hello".into()), &Value::Slice(None, Some(2))).unwrap(),
            Value::Str("he".into())
        );
        assert!(index(&Value::Int(1), &Value::Int(0)).is_err());
    }
}
