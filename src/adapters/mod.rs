//! Adapter interfaces for external systems.
//!
//! Adapters isolate the two collaborators the engine cannot trust or own:
//! the code executor that runs generated analysis code, and the loader that
//! turns a dataset reference into an in-memory table.

pub mod csv;
pub mod embedded;
pub mod process;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::core::safety::SafetyViolation;
use crate::domain::{ChartSpec, DatasetRef};
use crate::script::{ScriptError, Value};

// Re-export the adapters
pub use self::csv::CsvDatasetLoader;
pub use embedded::EmbeddedExecutor;
pub use process::ProcessExecutor;

/// What an executor hands back after running code
#[derive(Debug, Clone, Default)]
pub struct RawExecution {
    /// Everything written to standard output
    pub stdout: String,

    /// All bindings after the run, baseline included
    pub bindings: BTreeMap<String, Value>,

    /// Charts captured during the run, in capture order
    pub charts: Vec<ChartSpec>,
}

/// Why an execution did not complete
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// The code itself raised
    #[error("{message}")]
    Raised { kind: String, message: String },

    /// A resource limit stopped the run
    #[error(transparent)]
    Limit(#[from] SafetyViolation),

    /// The executor could not run the code at all
    #[error("Executor failure: {0}")]
    Executor(String),
}

impl From<ScriptError> for ExecutionError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::StepLimit { limit } => Self::Limit(SafetyViolation::StepBudget { limit }),
            other => Self::Raised {
                kind: other.kind().to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Trait for code executors
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Bindings every run starts from; never reported as new variables
    fn baseline(&self) -> BTreeMap<String, Value>;

    /// Run `code` against `bindings`
    async fn execute(
        &self,
        code: &str,
        bindings: BTreeMap<String, Value>,
    ) -> std::result::Result<RawExecution, ExecutionError>;

    /// Check that the executor is usable
    async fn health_check(&self) -> Result<()>;
}

/// Trait for dataset resolution
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    /// Read the dataset into a value analysis code can use
    async fn load(&self, dataset: &DatasetRef) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_errors_map_to_execution_errors() {
        let err: ExecutionError = ScriptError::ZeroDivision("division by zero".into()).into();
        assert_eq!(
            err,
            ExecutionError::Raised {
                kind: "ZeroDivisionError".into(),
                message: "division by zero".into()
            }
        );
        assert_eq!(err.to_string(), "division by zero");

        let err: ExecutionError = ScriptError::StepLimit { limit: 10 }.into();
        assert!(matches!(err, ExecutionError::Limit(SafetyViolation::StepBudget { limit: 10 })));
    }
}
