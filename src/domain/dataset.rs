//! Dataset references supplied with an analysis request.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A named, lazily loaded tabular input.
///
/// The variable name is what analysis code refers to; the dataset is only
/// read from `data_path` when the session does not already hold a binding
/// with that name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    /// Binding name inside the analysis namespace (e.g. `df`)
    pub variable_name: String,

    /// Location of the delimited text file
    pub data_path: PathBuf,

    /// Free-form description shown to the model when building prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DatasetRef {
    pub fn new(variable_name: impl Into<String>, data_path: impl Into<PathBuf>) -> Self {
        Self {
            variable_name: variable_name.into(),
            data_path: data_path.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.data_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_ref_serialization() {
        let dataset = DatasetRef::new("df", "/data/sales.csv");
        let json = serde_json::to_string(&dataset).unwrap();
        assert_eq!(json, r#"{"variable_name":"df","data_path":"/data/sales.csv"}"#);

        let parsed: DatasetRef = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, dataset);
        assert!(parsed.description.is_none());
    }
}
