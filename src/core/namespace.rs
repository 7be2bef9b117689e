//! Persistent variable namespace of a session.
//!
//! Bindings survive across turns so a conversation can build on earlier
//! results. Everything stored here has passed [`sanitize`], so the namespace
//! can always be serialized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::script::Value;

/// Ordered map of variable name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace {
    bindings: BTreeMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Bind `name`, sanitizing the value first
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), sanitize(value));
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    /// Sanitize and merge `updates`; later writes win
    pub fn absorb(&mut self, updates: BTreeMap<String, Value>) {
        for (name, value) in updates {
            self.insert(name, value);
        }
    }

    /// Bindings that are new or changed relative to `baseline`
    pub fn diff(&self, baseline: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        diff(&self.bindings, baseline)
    }
}

/// Entries of `bindings` absent from `baseline` or bound to a different value
pub fn diff(
    bindings: &BTreeMap<String, Value>,
    baseline: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    bindings
        .iter()
        .filter(|(name, value)| baseline.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Make a value safe to persist.
///
/// Tables get JSON-safe columns first. Anything that still does not come back
/// unchanged from a JSON round trip is replaced by its display string.
pub fn sanitize(value: Value) -> Value {
    let value = match value {
        Value::Frame(frame) => Value::Frame(frame.persistable()),
        Value::Series(series) => Value::Series(series.persistable()),
        other => other,
    };
    if round_trips(&value) {
        value
    } else {
        debug!(type_name = value.type_name(), "Persisting value as its string form");
        Value::Str(value.to_string())
    }
}

fn round_trips(value: &Value) -> bool {
    serde_json::to_string(value)
        .ok()
        .and_then(|json| serde_json::from_str::<Value>(&json).ok())
        .is_some_and(|parsed| &parsed == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{baseline, Column, DataFrame};
    use crate::domain::{ChartKind, ChartSpec};

    #[test]
    fn test_plain_values_are_kept() {
        for value in [
            Value::Int(3),
            Value::Float(2.5),
            Value::Str("north".into()),
            Value::List(vec![Value::Int(1), Value::None, Value::Bool(true)]),
        ] {
            assert_eq!(sanitize(value.clone()), value);
        }
    }

    #[test]
    fn test_unserializable_values_become_strings() {
        let chart = Value::Chart(ChartSpec::new(ChartKind::Bar).with_title("Sales"));
        let expected = chart.to_string();
        assert_eq!(sanitize(chart), Value::Str(expected));

        assert_eq!(sanitize(Value::Float(f64::NAN)), Value::Str("nan".into()));
        assert_eq!(sanitize(Value::Float(f64::INFINITY)), Value::Str("inf".into()));

        let nested = Value::List(vec![Value::Int(1), Value::Chart(ChartSpec::new(ChartKind::Pie))]);
        assert!(matches!(sanitize(nested), Value::Str(_)));
    }

    #[test]
    fn test_frames_get_text_columns() {
        let frame = DataFrame::new(vec![
            ("flag".into(), Column::Bool(vec![Some(true), None])),
            ("city".into(), Column::Text(vec![Some("Oslo".into()), None])),
            ("x".into(), Column::Float(vec![Some(1.0), Some(f64::NAN)])),
        ])
        .unwrap();

        let Value::Frame(clean) = sanitize(Value::Frame(frame)) else {
            panic!("frame should stay a frame");
        };
        assert_eq!(
            clean.column_ref("flag"),
            Some(&Column::Text(vec![Some("True".into()), Some("nan".into())]))
        );
        assert_eq!(
            clean.column_ref("city"),
            Some(&Column::Text(vec![Some("Oslo".into()), Some("nan".into())]))
        );
        assert_eq!(clean.column_ref("x"), Some(&Column::Float(vec![Some(1.0), None])));
    }

    #[test]
    fn test_diff_against_baseline() {
        let base = baseline();
        let mut bindings = base.clone();
        bindings.insert("total".into(), Value::Int(10));
        bindings.insert("print".into(), Value::Int(1));

        let new = diff(&bindings, &base);
        assert_eq!(new.len(), 2);
        assert_eq!(new["total"], Value::Int(10));
        assert_eq!(new["print"], Value::Int(1));

        assert!(diff(&base, &base).is_empty());
    }

    #[test]
    fn test_namespace_insert_sanitizes() {
        let mut namespace = Namespace::new();
        namespace.insert("fig", Value::Chart(ChartSpec::new(ChartKind::Line)));
        assert!(matches!(namespace.get("fig"), Some(Value::Str(_))));
        assert!(namespace.contains("fig"));

        let json = serde_json::to_string(&namespace).unwrap();
        let parsed: Namespace = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, namespace);
    }
}
