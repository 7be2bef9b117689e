//! In-process executor backed by the embedded analysis language.
//!
//! The interpreter is CPU bound, so each run goes to the blocking pool and is
//! raced against the configured timeout. The step budget guarantees a timed
//! out run still terminates on its own.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::{CodeExecutor, ExecutionError, RawExecution};
use crate::core::safety::{ExecutionLimits, SafetyViolation};
use crate::script::{self, Value};

/// Executor running the embedded language on a blocking thread
pub struct EmbeddedExecutor {
    limits: ExecutionLimits,
}

impl Default for EmbeddedExecutor {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

impl EmbeddedExecutor {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }
}

#[async_trait]
impl CodeExecutor for EmbeddedExecutor {
    fn name(&self) -> &str {
        "embedded"
    }

    fn baseline(&self) -> BTreeMap<String, Value> {
        script::baseline()
    }

    #[instrument(skip_all, fields(code_bytes = code.len()))]
    async fn execute(
        &self,
        code: &str,
        bindings: BTreeMap<String, Value>,
    ) -> std::result::Result<RawExecution, ExecutionError> {
        self.limits.validate_code(code)?;

        let source = code.to_string();
        let max_steps = self.limits.max_steps;
        let task = tokio::task::spawn_blocking(move || script::execute(&source, bindings, max_steps));

        let execution = match timeout(self.limits.timeout(), task).await {
            Err(_) => {
                warn!(limit_seconds = self.limits.timeout_seconds, "Execution timed out");
                return Err(SafetyViolation::Timeout {
                    limit_seconds: self.limits.timeout_seconds,
                }
                .into());
            }
            Ok(Err(join_err)) => return Err(ExecutionError::Executor(join_err.to_string())),
            Ok(Ok(result)) => result?,
        };

        self.limits.validate_output(&execution.stdout)?;
        debug!(charts = execution.charts.len(), "Execution finished");

        Ok(RawExecution {
            stdout: execution.stdout,
            bindings: execution.scope,
            charts: execution.charts,
        })
    }

    async fn health_check(&self) -> Result<()> {
        script::check("x = 1")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> BTreeMap<String, Value> {
        script::baseline()
    }

    #[tokio::test]
    async fn test_embedded_executor_runs_code() {
        let executor = EmbeddedExecutor::default();
        assert_eq!(executor.name(), "embedded");

        let raw = executor
            .execute("total = sum([1, 2, 3])\nprint(total)", bindings())
            .await
            .unwrap();
        assert_eq!(raw.stdout, "6\n");
        assert_eq!(raw.bindings["total"], Value::Int(6));
        assert!(raw.charts.is_empty());
    }

    #[tokio::test]
    async fn test_code_size_limit() {
        let executor = EmbeddedExecutor::new(ExecutionLimits {
            max_code_bytes: 4,
            ..Default::default()
        });
        let err = executor.execute("print(12345)", bindings()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Limit(SafetyViolation::MaxCodeBytes { .. })));
    }

    #[tokio::test]
    async fn test_output_size_limit() {
        let executor = EmbeddedExecutor::new(ExecutionLimits {
            max_output_bytes: 16,
            ..Default::default()
        });
        let err = executor
            .execute("for i in range(100):\n    print(i)", bindings())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Limit(SafetyViolation::MaxOutputBytes { .. })));
    }

    #[tokio::test]
    async fn test_oversized_sequence_is_a_raised_error() {
        let err = EmbeddedExecutor::default()
            .execute("s = 'x' * (10**15)", bindings())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Raised { ref kind, .. } if kind == "MemoryError"));

        let err = EmbeddedExecutor::default()
            .execute("r = range(-2**62, 2**62)", bindings())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Raised { ref kind, .. } if kind == "ValueError"));
    }

    #[tokio::test]
    async fn test_health_check() {
        assert!(EmbeddedExecutor::default().health_check().await.is_ok());
    }
}
