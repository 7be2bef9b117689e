//! Task requests and the results handed back to the request layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::dataset::DatasetRef;
use crate::script::Value;

/// One analysis turn: the datasets it needs plus generated code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub datasets: Vec<DatasetRef>,

    /// The model's reasoning for this step, echoed back in the result
    #[serde(default)]
    pub thought: String,

    /// Code to execute
    pub code: String,
}

impl TaskRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            datasets: Vec::new(),
            thought: String::new(),
            code: code.into(),
        }
    }

    pub fn with_dataset(mut self, dataset: DatasetRef) -> Self {
        self.datasets.push(dataset);
        self
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = thought.into();
        self
    }
}

/// Record of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateOutput {
    pub thought: String,
    pub code: String,
    pub output: String,
}

/// Whether the generated code ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// Result of one analysis turn.
///
/// A failed execution is still a result: `output` carries the error message
/// so the conversation can continue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,

    /// Captured standard output, or the error message
    pub output: String,

    pub intermediate_outputs: Vec<IntermediateOutput>,

    /// Bindings introduced by this session beyond the executor baseline
    #[serde(default)]
    pub current_variables: BTreeMap<String, Value>,

    /// Exported chart files; present only when at least one chart was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_filenames: Option<Vec<String>>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn chart_count(&self) -> usize {
        self.chart_filenames.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_filenames_omitted_when_absent() {
        let result = TaskResult {
            status: TaskStatus::Completed,
            output: "7.0\n".into(),
            intermediate_outputs: vec![],
            current_variables: BTreeMap::new(),
            chart_filenames: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("chart_filenames").is_none());
        assert_eq!(json["status"], "completed");
        assert_eq!(result.chart_count(), 0);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: TaskRequest = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert!(request.datasets.is_empty());
        assert!(request.thought.is_empty());
        assert_eq!(request.code, "print(1)");
    }
}
