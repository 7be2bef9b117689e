//! Columnar tables: [`Column`], [`Series`], [`DataFrame`] and [`GroupBy`].
//!
//! Missing cells are `None` in every column type. Numeric aggregations skip
//! missing cells; an aggregation over nothing yields NaN.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::error::{ScriptError, ScriptResult};
use super::value::{fmt_float, round_to, Value};

/// Cell text read as a missing value when inferring column types
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NULL", "null", "NaN", "nan", "None", "<NA>",
];

/// Tables longer than this print only their head and tail
const MAX_DISPLAY_ROWS: usize = 60;
const TRUNCATED_EDGE: usize = 5;

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// A typed vector of cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "snake_case")]
pub enum Column {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl Default for Column {
    fn default() -> Self {
        Self::Float(Vec::new())
    }
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Self::Int(_) => "int64",
            Self::Float(_) => "float64",
            Self::Bool(_) => "bool",
            Self::Text(_) => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Int(v) => v[row].is_none(),
            Self::Float(v) => v[row].is_none(),
            Self::Bool(v) => v[row].is_none(),
            Self::Text(v) => v[row].is_none(),
        }
    }

    /// Cell as a script value; missing numbers read as NaN, other missing cells as `None`
    pub fn get(&self, row: usize) -> Value {
        match self {
            Self::Int(v) => v[row].map(Value::Int).unwrap_or(Value::Float(f64::NAN)),
            Self::Float(v) => Value::Float(v[row].unwrap_or(f64::NAN)),
            Self::Bool(v) => v[row].map(Value::Bool).unwrap_or(Value::None),
            Self::Text(v) => v[row].clone().map(Value::Str).unwrap_or(Value::None),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|row| self.get(row)).collect()
    }

    /// Cell as a number, if the column is numeric (or boolean) and the cell present
    pub fn number(&self, row: usize) -> Option<f64> {
        match self {
            Self::Int(v) => v[row].map(|i| i as f64),
            Self::Float(v) => v[row],
            Self::Bool(v) => v[row].map(|b| if b { 1.0 } else { 0.0 }),
            Self::Text(_) => None,
        }
    }

    /// All present cells as numbers
    pub fn numbers(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|row| self.number(row)).collect()
    }

    pub fn to_json(&self, row: usize) -> JsonValue {
        if self.is_missing(row) {
            JsonValue::Null
        } else {
            self.get(row).to_json()
        }
    }

    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Self::Int(v) => Self::Int(rows.iter().map(|&r| v[r]).collect()),
            Self::Float(v) => Self::Float(rows.iter().map(|&r| v[r]).collect()),
            Self::Bool(v) => Self::Bool(rows.iter().map(|&r| v[r]).collect()),
            Self::Text(v) => Self::Text(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    /// Compare two present cells
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        match self {
            Self::Int(v) => v[a].cmp(&v[b]),
            Self::Float(v) => v[a]
                .partial_cmp(&v[b])
                .unwrap_or(Ordering::Equal),
            Self::Bool(v) => v[a].cmp(&v[b]),
            Self::Text(v) => v[a].cmp(&v[b]),
        }
    }

    /// Build a column from script values, picking the narrowest type that fits
    pub fn from_values(values: &[Value]) -> ScriptResult<Column> {
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_missing()).collect();
        let has_missing = present.len() != values.len();

        if present.is_empty() {
            return Ok(Self::Float(vec![None; values.len()]));
        }
        if present.iter().all(|v| matches!(v, Value::Bool(_))) {
            return Ok(Self::Bool(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect(),
            ));
        }
        if !has_missing && present.iter().all(|v| matches!(v, Value::Int(_))) {
            return Ok(Self::Int(values.iter().map(Value::as_int).collect()));
        }
        if present.iter().all(|v| v.is_number()) {
            return Ok(Self::Float(
                values
                    .iter()
                    .map(|v| v.as_f64().filter(|x| !x.is_nan()))
                    .collect(),
            ));
        }
        for value in &present {
            if matches!(value, Value::Series(_) | Value::Frame(_)) {
                return Err(ScriptError::ValueError(format!(
                    "cannot store a {} inside a column",
                    value.type_name()
                )));
            }
        }
        Ok(Self::Text(
            values
                .iter()
                .map(|v| (!v.is_missing()).then(|| v.to_string()))
                .collect(),
        ))
    }

    /// Infer a column from raw text cells (CSV input)
    pub fn infer(raw: &[String]) -> Column {
        let cells: Vec<Option<&str>> = raw
            .iter()
            .map(|cell| {
                let trimmed = cell.trim();
                (!MISSING_MARKERS.contains(&trimmed)).then_some(trimmed)
            })
            .collect();
        let present: Vec<&str> = cells.iter().flatten().copied().collect();
        let has_missing = present.len() != cells.len();

        if present.is_empty() {
            return Self::Float(vec![None; cells.len()]);
        }
        if present.iter().all(|c| c.parse::<i64>().is_ok()) {
            let parsed = cells.iter().map(|c| c.and_then(|c| c.parse::<i64>().ok()));
            return if has_missing {
                Self::Float(parsed.map(|c| c.map(|i| i as f64)).collect())
            } else {
                Self::Int(parsed.collect())
            };
        }
        if present.iter().all(|c| c.parse::<f64>().is_ok()) {
            return Self::Float(
                cells
                    .iter()
                    .map(|c| c.and_then(|c| c.parse::<f64>().ok()).filter(|x| !x.is_nan()))
                    .collect(),
            );
        }
        if present.iter().all(|c| parse_bool(c).is_some()) {
            return Self::Bool(cells.iter().map(|c| c.and_then(parse_bool)).collect());
        }
        Self::Text(
            raw.iter()
                .zip(&cells)
                .map(|(original, cell)| cell.map(|_| original.clone()))
                .collect(),
        )
    }

    /// Round numeric cells; other columns are returned unchanged
    pub fn round(&self, digits: i32) -> Column {
        match self {
            Self::Float(v) => Self::Float(v.iter().map(|x| x.map(|x| round_to(x, digits))).collect()),
            other => other.clone(),
        }
    }

    /// Column that survives a JSON round trip: bool and text cells become
    /// strings (missing as `nan`), non-finite floats become missing
    pub fn persistable(&self) -> Column {
        match self {
            Self::Int(v) => Self::Int(v.clone()),
            Self::Float(v) => Self::Float(
                v.iter()
                    .map(|x| x.filter(|x| x.is_finite()))
                    .collect(),
            ),
            Self::Bool(v) => Self::Text(
                v.iter()
                    .map(|b| {
                        Some(match b {
                            Some(true) => "True".to_string(),
                            Some(false) => "False".to_string(),
                            None => "nan".to_string(),
                        })
                    })
                    .collect(),
            ),
            Self::Text(v) => Self::Text(
                v.iter()
                    .map(|s| Some(s.clone().unwrap_or_else(|| "nan".to_string())))
                    .collect(),
            ),
        }
    }

    /// Display text of a single cell
    fn cell_text(&self, row: usize) -> String {
        match self {
            Self::Int(v) => v[row].map(|i| i.to_string()).unwrap_or("NaN".into()),
            Self::Float(v) => v[row].map(fmt_float).unwrap_or("NaN".into()),
            Self::Bool(v) => match v[row] {
                Some(true) => "True".into(),
                Some(false) => "False".into(),
                None => "None".into(),
            },
            Self::Text(v) => v[row].clone().unwrap_or("None".into()),
        }
    }

    /// Display text for the given rows; floats share one precision per column
    fn display_cells(&self, rows: &[Option<usize>]) -> Vec<String> {
        let precision = match self {
            Self::Float(v) => rows
                .iter()
                .flatten()
                .filter_map(|&r| v[r])
                .filter(|x| x.is_finite() && x.abs() < 1e16)
                .map(decimals_needed)
                .max(),
            _ => None,
        };
        rows.iter()
            .map(|row| match (row, self, precision) {
                (None, _, _) => "...".to_string(),
                (Some(r), Self::Float(v), Some(p)) => match v[*r] {
                    Some(x) if x.is_finite() && x.abs() < 1e16 => format!("{:.*}", p, x),
                    Some(x) => fmt_float(x),
                    None => "NaN".to_string(),
                },
                (Some(r), column, _) => column.cell_text(*r),
            })
            .collect()
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Decimal places (1..=6) needed to show `x` the way tables print floats
fn decimals_needed(x: f64) -> usize {
    let fixed = format!("{:.6}", x);
    let trimmed = fixed.trim_end_matches('0');
    let decimals = trimmed.split_once('.').map(|(_, d)| d.len()).unwrap_or(0);
    decimals.max(1)
}

fn visible_rows(rows: usize) -> Vec<Option<usize>> {
    if rows <= MAX_DISPLAY_ROWS {
        (0..rows).map(Some).collect()
    } else {
        (0..TRUNCATED_EDGE)
            .map(Some)
            .chain(std::iter::once(None))
            .chain((rows - TRUNCATED_EDGE..rows).map(Some))
            .collect()
    }
}

fn width(text: &str) -> usize {
    text.chars().count()
}

/// Row order sorting by `keys` in turn; missing cells always sort last
fn sort_order(keys: &[&Column], rows: usize, ascending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows).collect();
    order.sort_by(|&a, &b| {
        for column in keys {
            let ord = match (column.is_missing(a), column.is_missing(b)) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) if ascending => column.compare(a, b),
                (false, false) => column.compare(a, b).reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    order
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Linear-interpolated quantile
fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Reductions shared by series, group-bys and `describe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    Std,
    Var,
    Nunique,
    Size,
}

impl Agg {
    pub fn from_method(name: &str) -> Option<Agg> {
        Some(match name {
            "sum" => Self::Sum,
            "mean" => Self::Mean,
            "median" => Self::Median,
            "min" => Self::Min,
            "max" => Self::Max,
            "count" => Self::Count,
            "std" => Self::Std,
            "var" => Self::Var,
            "nunique" => Self::Nunique,
            "size" => Self::Size,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::Std => "std",
            Self::Var => "var",
            Self::Nunique => "nunique",
            Self::Size => "size",
        }
    }

    fn numeric_only(self) -> bool {
        matches!(self, Self::Mean | Self::Median | Self::Std | Self::Var)
    }
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Row labels carried by aggregation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: Option<String>,
    pub labels: Column,
}

impl Index {
    fn take(&self, rows: &[usize]) -> Index {
        Index {
            name: self.name.clone(),
            labels: self.labels.take(rows),
        }
    }
}

/// A named column with optional row labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: Option<String>,
    pub values: Column,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Index>,
}

impl Series {
    pub fn new(name: Option<String>, values: Column) -> Self {
        Self {
            name,
            values,
            index: None,
        }
    }

    pub fn with_index(mut self, index: Option<Index>) -> Self {
        self.index = index;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same labels and name, new values
    pub fn with_values(&self, values: Column) -> Series {
        Series {
            name: self.name.clone(),
            values,
            index: self.index.clone(),
        }
    }

    pub fn take(&self, rows: &[usize]) -> Series {
        Series {
            name: self.name.clone(),
            values: self.values.take(rows),
            index: self.index.as_ref().map(|index| index.take(rows)),
        }
    }

    pub fn head(&self, n: usize) -> Series {
        let rows: Vec<usize> = (0..n.min(self.len())).collect();
        self.take(&rows)
    }

    pub fn tail(&self, n: usize) -> Series {
        let len = self.len();
        let rows: Vec<usize> = (len.saturating_sub(n)..len).collect();
        self.take(&rows)
    }

    pub fn filter(&self, mask: &Column) -> ScriptResult<Series> {
        Ok(self.take(&mask_rows(mask, self.len())?))
    }

    pub fn sort_values(&self, ascending: bool) -> Series {
        self.take(&sort_order(&[&self.values], self.len(), ascending))
    }

    /// Look up an element by label (when labelled) or by position
    pub fn item(&self, key: &Value) -> ScriptResult<Value> {
        if let Some(index) = &self.index {
            for row in 0..index.labels.len() {
                if index.labels.get(row).py_eq(key) {
                    return Ok(self.values.get(row));
                }
            }
        }
        match key {
            Value::Int(position) => {
                let len = self.len() as i64;
                let row = if *position < 0 { position + len } else { *position };
                if row < 0 || row >= len {
                    return Err(ScriptError::IndexError(
                        "index out of bounds".to_string(),
                    ));
                }
                Ok(self.values.get(row as usize))
            }
            other => Err(ScriptError::KeyError(other.to_string())),
        }
    }

    pub fn aggregate(&self, agg: Agg) -> ScriptResult<Value> {
        let column = &self.values;
        if agg.numeric_only() && matches!(column, Column::Text(_)) {
            return Err(ScriptError::type_error(format!(
                "Could not convert string to numeric for '{}'",
                agg.name()
            )));
        }
        Ok(match agg {
            Agg::Size => Value::Int(self.len() as i64),
            Agg::Count => {
                Value::Int((0..column.len()).filter(|&r| !column.is_missing(r)).count() as i64)
            }
            Agg::Nunique => Value::Int(self.distinct_rows().len() as i64),
            Agg::Mean => Value::Float(mean(&column.numbers())),
            Agg::Median => Value::Float(quantile(&column.numbers(), 0.5)),
            Agg::Var => Value::Float(variance(&column.numbers())),
            Agg::Std => Value::Float(variance(&column.numbers()).sqrt()),
            Agg::Sum => match column {
                Column::Int(v) => v
                    .iter()
                    .flatten()
                    .try_fold(0i64, |acc, &x| acc.checked_add(x))
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::Float(column.numbers().iter().sum())),
                Column::Bool(v) => Value::Int(v.iter().flatten().filter(|b| **b).count() as i64),
                Column::Float(_) => Value::Float(column.numbers().iter().sum()),
                Column::Text(v) => Value::Str(v.iter().flatten().map(String::as_str).collect()),
            },
            Agg::Min | Agg::Max => {
                let present: Vec<usize> =
                    (0..column.len()).filter(|&r| !column.is_missing(r)).collect();
                let pick = present.iter().copied().reduce(|best, row| {
                    let ord = column.compare(row, best);
                    let better = if agg == Agg::Min {
                        ord == Ordering::Less
                    } else {
                        ord == Ordering::Greater
                    };
                    if better {
                        row
                    } else {
                        best
                    }
                });
                match pick {
                    Some(row) => column.get(row),
                    None => Value::Float(f64::NAN),
                }
            }
        })
    }

    /// Position (or label) of the first minimum / maximum
    pub fn arg_extreme(&self, largest: bool) -> ScriptResult<Value> {
        let column = &self.values;
        let mut best: Option<usize> = None;
        for row in (0..column.len()).filter(|&r| !column.is_missing(r)) {
            best = match best {
                None => Some(row),
                Some(current) => {
                    let ord = column.compare(row, current);
                    let better = if largest {
                        ord == Ordering::Greater
                    } else {
                        ord == Ordering::Less
                    };
                    Some(if better { row } else { current })
                }
            };
        }
        let row = best.ok_or_else(|| {
            ScriptError::ValueError("attempt to get argmax of an empty sequence".to_string())
        })?;
        Ok(match &self.index {
            Some(index) => index.labels.get(row),
            None => Value::Int(row as i64),
        })
    }

    /// First row of every distinct present value, in order of appearance
    fn distinct_rows(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        (0..self.len())
            .filter(|&r| !self.values.is_missing(r))
            .filter(|&r| seen.insert(self.values.cell_text(r)))
            .collect()
    }

    pub fn unique(&self) -> Vec<Value> {
        let mut rows = self.distinct_rows();
        if let Some(missing) = (0..self.len()).find(|&r| self.values.is_missing(r)) {
            rows.push(missing);
            rows.sort_unstable();
        }
        rows.into_iter().map(|r| self.values.get(r)).collect()
    }

    /// Occurrences of each distinct value, most frequent first
    pub fn value_counts(&self) -> Series {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in (0..self.len()).filter(|&r| !self.values.is_missing(r)) {
            *counts.entry(self.values.cell_text(row)).or_default() += 1;
        }
        let mut rows = self.distinct_rows();
        rows.sort_by_key(|&r| std::cmp::Reverse(counts[&self.values.cell_text(r)]));
        let totals = rows
            .iter()
            .map(|&r| Some(counts[&self.values.cell_text(r)]))
            .collect();
        Series {
            name: Some("count".to_string()),
            values: Column::Int(totals),
            index: Some(Index {
                name: self.name.clone(),
                labels: self.values.take(&rows),
            }),
        }
    }

    pub fn cumsum(&self) -> ScriptResult<Series> {
        let mut running = 0.0;
        let values: Vec<Option<f64>> = match &self.values {
            Column::Text(_) => {
                return Err(ScriptError::type_error("cumsum is not supported for text columns"))
            }
            column => (0..column.len())
                .map(|r| {
                    column.number(r).map(|x| {
                        running += x;
                        running
                    })
                })
                .collect(),
        };
        let column = match self.values {
            Column::Int(_) if !self.values_have_missing() => Column::Int(
                values_to_ints(values),
            ),
            _ => Column::Float(values),
        };
        Ok(self.with_values(column))
    }

    fn values_have_missing(&self) -> bool {
        (0..self.len()).any(|r| self.values.is_missing(r))
    }

    pub fn describe(&self) -> ScriptResult<Series> {
        let (labels, values) = summary(&self.values);
        Ok(Series {
            name: self.name.clone(),
            values: Column::from_values(&values)?,
            index: Some(Index {
                name: None,
                labels: Column::Text(labels.into_iter().map(Some).collect()),
            }),
        })
    }

    /// Labels become a column, values another
    pub fn reset_index(&self) -> ScriptResult<DataFrame> {
        let (index_name, labels) = match &self.index {
            Some(index) => (
                index.name.clone().unwrap_or("index".to_string()),
                index.labels.clone(),
            ),
            None => (
                "index".to_string(),
                Column::Int((0..self.len() as i64).map(Some).collect()),
            ),
        };
        let name = self.name.clone().unwrap_or("0".to_string());
        DataFrame::new(vec![(index_name, labels), (name, self.values.clone())])
    }

    pub fn to_frame(&self) -> ScriptResult<DataFrame> {
        let name = self.name.clone().unwrap_or("0".to_string());
        Ok(DataFrame::new(vec![(name, self.values.clone())])?.with_index(self.index.clone()))
    }
}

impl Index {
    fn persistable(&self) -> Index {
        Index {
            name: self.name.clone(),
            labels: self.labels.persistable(),
        }
    }
}

impl Series {
    pub fn persistable(&self) -> Series {
        Series {
            name: self.name.clone(),
            values: self.values.persistable(),
            index: self.index.as_ref().map(Index::persistable),
        }
    }
}

fn values_to_ints(values: Vec<Option<f64>>) -> Vec<Option<i64>> {
    values.into_iter().map(|x| x.map(|x| x as i64)).collect()
}

/// `describe()` rows for one column
fn summary(column: &Column) -> (Vec<String>, Vec<Value>) {
    if column.is_numeric() {
        let numbers = column.numbers();
        let labels = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
        let stats = vec![
            numbers.len() as f64,
            mean(&numbers),
            variance(&numbers).sqrt(),
            quantile(&numbers, 0.0),
            quantile(&numbers, 0.25),
            quantile(&numbers, 0.5),
            quantile(&numbers, 0.75),
            quantile(&numbers, 1.0),
        ];
        (
            labels.iter().map(|l| l.to_string()).collect(),
            stats.into_iter().map(Value::Float).collect(),
        )
    } else {
        let series = Series::new(None, column.clone());
        let counts = series.value_counts();
        let count = (0..column.len()).filter(|&r| !column.is_missing(r)).count();
        let (top, freq) = if counts.is_empty() {
            (Value::None, Value::None)
        } else {
            let top = counts
                .index
                .as_ref()
                .map(|index| index.labels.get(0))
                .unwrap_or(Value::None);
            (top, counts.values.get(0))
        };
        (
            ["count", "unique", "top", "freq"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
            vec![
                Value::Int(count as i64),
                Value::Int(counts.len() as i64),
                top,
                freq,
            ],
        )
    }
}

fn mask_rows(mask: &Column, rows: usize) -> ScriptResult<Vec<usize>> {
    let Column::Bool(flags) = mask else {
        return Err(ScriptError::type_error(format!(
            "boolean mask required, got {} values",
            mask.dtype()
        )));
    };
    if flags.len() != rows {
        return Err(ScriptError::ValueError(format!(
            "Item wrong length {} instead of {}.",
            flags.len(),
            rows
        )));
    }
    Ok(flags
        .iter()
        .enumerate()
        .filter(|(_, flag)| flag.unwrap_or(false))
        .map(|(row, _)| row)
        .collect())
}

fn index_cells(index: Option<&Index>, rows: &[Option<usize>]) -> Vec<String> {
    match index {
        Some(index) => index.labels.display_cells(rows),
        None => rows
            .iter()
            .map(|r| r.map(|r| r.to_string()).unwrap_or("...".to_string()))
            .collect(),
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let picks = visible_rows(self.len());
        let labels = index_cells(self.index.as_ref(), &picks);
        let cells = self.values.display_cells(&picks);
        let label_width = labels.iter().map(|l| width(l)).max().unwrap_or(0);
        let cell_width = cells.iter().map(|c| width(c)).max().unwrap_or(0);

        let mut lines = Vec::with_capacity(picks.len() + 2);
        if let Some(name) = self.index.as_ref().and_then(|index| index.name.as_ref()) {
            lines.push(name.clone());
        }
        for (label, cell) in labels.iter().zip(&cells) {
            lines.push(format!(
                "{:<lw$}    {:>cw$}",
                label,
                cell,
                lw = label_width,
                cw = cell_width
            ));
        }
        let mut footer = Vec::new();
        if let Some(name) = &self.name {
            footer.push(format!("Name: {}", name));
        }
        if self.len() > MAX_DISPLAY_ROWS {
            footer.push(format!("Length: {}", self.len()));
        }
        footer.push(format!("dtype: {}", self.values.dtype()));
        if self.is_empty() {
            lines.push(format!("Series([], {})", footer.join(", ")));
            return write!(f, "{}", lines.join("\n"));
        }
        lines.push(footer.join(", "));
        write!(f, "{}", lines.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// DataFrame
// ---------------------------------------------------------------------------

/// Equal-length named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<Index>,
}

impl DataFrame {
    pub fn new(columns: Vec<(String, Column)>) -> ScriptResult<Self> {
        let rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        if columns.iter().any(|(_, c)| c.len() != rows) {
            return Err(ScriptError::ValueError(
                "All arrays must be of the same length".to_string(),
            ));
        }
        let (names, columns) = columns.into_iter().unzip();
        Ok(Self {
            names,
            columns,
            rows,
            index: None,
        })
    }

    /// Build a frame from CSV-like text rows, inferring each column's type
    pub fn from_records(headers: Vec<String>, records: &[Vec<String>]) -> ScriptResult<Self> {
        let mut columns = Vec::with_capacity(headers.len());
        for (position, header) in headers.into_iter().enumerate() {
            let cells: Vec<String> = records
                .iter()
                .map(|record| record.get(position).cloned().unwrap_or_default())
                .collect();
            columns.push((header, Column::infer(&cells)));
        }
        let mut frame = Self::new(columns)?;
        frame.rows = records.len();
        Ok(frame)
    }

    pub fn with_index(mut self, index: Option<Index>) -> Self {
        if self.columns.is_empty() {
            if let Some(index) = &index {
                self.rows = index.labels.len();
            }
        }
        self.index = index;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column_ref(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|position| &self.columns[position])
    }

    pub fn require(&self, name: &str) -> ScriptResult<&Column> {
        self.column_ref(name)
            .ok_or_else(|| ScriptError::KeyError(name.to_string()))
    }

    /// A column as a series sharing the frame's row labels
    pub fn column(&self, name: &str) -> ScriptResult<Series> {
        Ok(Series {
            name: Some(name.to_string()),
            values: self.require(name)?.clone(),
            index: self.index.clone(),
        })
    }

    pub fn select(&self, names: &[String]) -> ScriptResult<DataFrame> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push((name.clone(), self.require(name)?.clone()));
        }
        let mut frame = Self::new(columns)?.with_index(self.index.clone());
        frame.rows = self.rows;
        Ok(frame)
    }

    pub fn take(&self, rows: &[usize]) -> DataFrame {
        DataFrame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            rows: rows.len(),
            index: self.index.as_ref().map(|index| index.take(rows)),
        }
    }

    pub fn head(&self, n: usize) -> DataFrame {
        let rows: Vec<usize> = (0..n.min(self.rows)).collect();
        self.take(&rows)
    }

    pub fn tail(&self, n: usize) -> DataFrame {
        let rows: Vec<usize> = (self.rows.saturating_sub(n)..self.rows).collect();
        self.take(&rows)
    }

    pub fn filter(&self, mask: &Column) -> ScriptResult<DataFrame> {
        Ok(self.take(&mask_rows(mask, self.rows)?))
    }

    /// Replace or append a column
    pub fn set_column(&mut self, name: &str, column: Column) -> ScriptResult<()> {
        if !self.columns.is_empty() && column.len() != self.rows {
            return Err(ScriptError::ValueError(format!(
                "Length of values ({}) does not match length of index ({})",
                column.len(),
                self.rows
            )));
        }
        if self.columns.is_empty() {
            self.rows = column.len();
        }
        match self.names.iter().position(|n| n == name) {
            Some(position) => self.columns[position] = column,
            None => {
                self.names.push(name.to_string());
                self.columns.push(column);
            }
        }
        Ok(())
    }

    pub fn sort_values(&self, by: &[String], ascending: bool) -> ScriptResult<DataFrame> {
        let mut keys = Vec::with_capacity(by.len());
        for name in by {
            keys.push(self.require(name)?);
        }
        Ok(self.take(&sort_order(&keys, self.rows, ascending)))
    }

    /// Drop rows with any missing cell
    pub fn dropna(&self) -> DataFrame {
        let rows: Vec<usize> = (0..self.rows)
            .filter(|&r| !self.columns.iter().any(|c| c.is_missing(r)))
            .collect();
        self.take(&rows)
    }

    pub fn describe(&self) -> ScriptResult<DataFrame> {
        let numeric: Vec<usize> = (0..self.columns.len())
            .filter(|&i| self.columns[i].is_numeric())
            .collect();
        let chosen: Vec<usize> = if numeric.is_empty() {
            (0..self.columns.len()).collect()
        } else {
            numeric
        };

        let mut labels = Vec::new();
        let mut columns = Vec::with_capacity(chosen.len());
        for position in chosen {
            let (row_labels, values) = summary(&self.columns[position]);
            labels = row_labels;
            columns.push((self.names[position].clone(), Column::from_values(&values)?));
        }
        Ok(Self::new(columns)?.with_index(Some(Index {
            name: None,
            labels: Column::Text(labels.into_iter().map(Some).collect()),
        })))
    }

    /// Frame whose columns all survive a JSON round trip
    pub fn persistable(&self) -> DataFrame {
        DataFrame {
            names: self.names.clone(),
            columns: self.columns.iter().map(Column::persistable).collect(),
            rows: self.rows,
            index: self.index.as_ref().map(Index::persistable),
        }
    }

    /// Row labels become the first column
    pub fn reset_index(&self) -> ScriptResult<DataFrame> {
        let (name, labels) = match &self.index {
            Some(index) => (
                index.name.clone().unwrap_or("index".to_string()),
                index.labels.clone(),
            ),
            None => (
                "index".to_string(),
                Column::Int((0..self.rows as i64).map(Some).collect()),
            ),
        };
        let mut columns = vec![(name, labels)];
        columns.extend(self.names.iter().cloned().zip(self.columns.iter().cloned()));
        Self::new(columns)
    }

    pub fn groupby(&self, key: &str) -> ScriptResult<GroupBy> {
        self.require(key)?;
        Ok(GroupBy {
            frame: self.clone(),
            key: key.to_string(),
            selection: Selection::All,
        })
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() || self.rows == 0 {
            return write!(
                f,
                "Empty DataFrame\nColumns: [{}]\nIndex: []",
                self.names.join(", ")
            );
        }

        let picks = visible_rows(self.rows);
        let labels = index_cells(self.index.as_ref(), &picks);
        let index_name = self.index.as_ref().and_then(|index| index.name.clone());
        let label_width = labels
            .iter()
            .map(|l| width(l))
            .chain(index_name.as_deref().map(width))
            .max()
            .unwrap_or(0);
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| c.display_cells(&picks))
            .collect();
        let widths: Vec<usize> = self
            .names
            .iter()
            .zip(&cells)
            .map(|(name, column)| {
                column
                    .iter()
                    .map(|c| width(c))
                    .chain(std::iter::once(width(name)))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(picks.len() + 2);
        let mut header = " ".repeat(label_width);
        for (name, w) in self.names.iter().zip(&widths) {
            header.push_str(&format!("  {:>w$}", name, w = *w));
        }
        lines.push(header);
        if let Some(name) = index_name {
            lines.push(name);
        }
        for (row, label) in labels.iter().enumerate() {
            let mut line = format!("{:<w$}", label, w = label_width);
            for (column, w) in cells.iter().zip(&widths) {
                line.push_str(&format!("  {:>w$}", column[row], w = *w));
            }
            lines.push(line);
        }
        write!(f, "{}", lines.join("\n"))?;
        if self.rows > MAX_DISPLAY_ROWS {
            write!(f, "\n\n[{} rows x {} columns]", self.rows, self.width())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GroupBy
// ---------------------------------------------------------------------------

/// Which columns a group-by aggregates
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    One(String),
    Many(Vec<String>),
}

/// `frame.groupby(key)`, optionally narrowed with `[column]`
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    frame: DataFrame,
    key: String,
    selection: Selection,
}

impl GroupBy {
    pub fn select(&self, selection: Selection) -> ScriptResult<GroupBy> {
        match &selection {
            Selection::One(name) => {
                self.frame.require(name)?;
            }
            Selection::Many(names) => {
                for name in names {
                    self.frame.require(name)?;
                }
            }
            Selection::All => {}
        }
        Ok(GroupBy {
            frame: self.frame.clone(),
            key: self.key.clone(),
            selection,
        })
    }

    /// Distinct keys in sorted order and the rows belonging to each
    fn groups(&self) -> ScriptResult<(Column, Vec<Vec<usize>>)> {
        let keys = self.frame.require(&self.key)?;
        let mut buckets: Vec<(usize, Vec<usize>)> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        for row in (0..keys.len()).filter(|&r| !keys.is_missing(r)) {
            let key = keys.cell_text(row);
            match slots.get(&key) {
                Some(&slot) => buckets[slot].1.push(row),
                None => {
                    slots.insert(key, buckets.len());
                    buckets.push((row, vec![row]));
                }
            }
        }
        buckets.sort_by(|a, b| keys.compare(a.0, b.0));
        let firsts: Vec<usize> = buckets.iter().map(|(first, _)| *first).collect();
        Ok((
            keys.take(&firsts),
            buckets.into_iter().map(|(_, rows)| rows).collect(),
        ))
    }

    fn aggregate_column(&self, name: &str, groups: &[Vec<usize>], agg: Agg) -> ScriptResult<Column> {
        let column = self.frame.require(name)?;
        let mut reduced = Vec::with_capacity(groups.len());
        for rows in groups {
            reduced.push(Series::new(None, column.take(rows)).aggregate(agg)?);
        }
        Column::from_values(&reduced)
    }

    pub fn aggregate(&self, agg: Agg) -> ScriptResult<Value> {
        let (labels, groups) = self.groups()?;
        let index = Index {
            name: Some(self.key.clone()),
            labels,
        };

        if agg == Agg::Size {
            let sizes = groups.iter().map(|rows| Some(rows.len() as i64)).collect();
            return Ok(Series::new(None, Column::Int(sizes))
                .with_index(Some(index))
                .into());
        }

        let targets: Vec<String> = match &self.selection {
            Selection::One(name) => {
                let values = self.aggregate_column(name, &groups, agg)?;
                return Ok(Series::new(Some(name.clone()), values)
                    .with_index(Some(index))
                    .into());
            }
            Selection::Many(names) => names.clone(),
            Selection::All => self
                .frame
                .names()
                .iter()
                .filter(|name| **name != self.key)
                .filter(|name| {
                    !agg.numeric_only()
                        || self
                            .frame
                            .column_ref(name)
                            .is_some_and(|c| !matches!(c, Column::Text(_)))
                })
                .cloned()
                .collect(),
        };

        let mut columns = Vec::with_capacity(targets.len());
        for name in targets {
            let values = self.aggregate_column(&name, &groups, agg)?;
            columns.push((name, values));
        }
        Ok(DataFrame::new(columns)?.with_index(Some(index)).into())
    }
}
