//! Executor that delegates to an external interpreter process.
//!
//! Each call spawns the configured command, writes one JSON request to its
//! stdin and reads one JSON response from its stdout:
//!
//! ```text
//! request:  {"code": "...", "variables": {"df": {"type": "frame", "value": ...}}}
//! response: {"output": "...", "variables": {...}, "charts": [...], "error": null}
//! ```
//!
//! Response variables may use the tagged form of the request or plain JSON.
//! The child is killed when the timeout expires.

use std::collections::BTreeMap;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::{CodeExecutor, ExecutionError, RawExecution};
use crate::core::safety::{ExecutionLimits, SafetyViolation};
use crate::domain::ChartSpec;
use crate::script::Value;

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
    variables: BTreeMap<&'a str, &'a Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    output: String,
    #[serde(default)]
    variables: BTreeMap<String, JsonValue>,
    #[serde(default)]
    charts: Vec<ChartSpec>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

/// Executor using a subprocess per call
pub struct ProcessExecutor {
    /// Interpreter command (e.g. "python3")
    command: String,

    /// Arguments passed before the request is written (e.g. a runner script)
    args: Vec<String>,

    limits: ExecutionLimits,
}

impl ProcessExecutor {
    pub fn new(command: impl Into<String>, args: Vec<String>, limits: ExecutionLimits) -> Self {
        Self {
            command: command.into(),
            args,
            limits,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn run_child(&self, payload: &[u8]) -> std::result::Result<Vec<u8>, ExecutionError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::Executor(format!("Failed to spawn '{}': {}", self.command, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload)
                .await
                .map_err(|e| ExecutionError::Executor(format!("Failed to write request: {}", e)))?;
            // Drop stdin to signal EOF
        }

        // Dropping the future on timeout kills the child
        let output = match timeout(self.limits.timeout(), child.wait_with_output()).await {
            Err(_) => {
                warn!(command = %self.command, "Executor process timed out");
                return Err(SafetyViolation::Timeout {
                    limit_seconds: self.limits.timeout_seconds,
                }
                .into());
            }
            Ok(result) => result.map_err(|e| {
                ExecutionError::Executor(format!("Failed to wait for '{}': {}", self.command, e))
            })?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(ExecutionError::Executor(format!(
                "'{}' failed with exit code {}: {}",
                self.command,
                exit_code,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl CodeExecutor for ProcessExecutor {
    fn name(&self) -> &str {
        "process"
    }

    fn baseline(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    #[instrument(skip_all, fields(command = %self.command))]
    async fn execute(
        &self,
        code: &str,
        bindings: BTreeMap<String, Value>,
    ) -> std::result::Result<RawExecution, ExecutionError> {
        self.limits.validate_code(code)?;

        // Only bindings that serialize cross the process boundary
        let variables = bindings
            .iter()
            .filter(|(_, value)| serde_json::to_value(value).is_ok())
            .map(|(name, value)| (name.as_str(), value))
            .collect();
        let payload = serde_json::to_vec(&ExecuteRequest { code, variables })
            .map_err(|e| ExecutionError::Executor(format!("Failed to encode request: {}", e)))?;

        let stdout = self.run_child(&payload).await?;
        let response: ExecuteResponse = serde_json::from_slice(&stdout)
            .map_err(|e| ExecutionError::Executor(format!("Malformed executor response: {}", e)))?;

        if let Some(message) = response.error {
            return Err(ExecutionError::Raised {
                kind: response.error_type.unwrap_or_else(|| "Exception".to_string()),
                message,
            });
        }

        self.limits.validate_output(&response.output)?;
        debug!(
            variables = response.variables.len(),
            charts = response.charts.len(),
            "Executor process finished"
        );

        let mut merged = bindings;
        for (name, raw) in response.variables {
            merged.insert(name, decode_binding(raw));
        }

        Ok(RawExecution {
            stdout: response.output,
            bindings: merged,
            charts: response.charts,
        })
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.command)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("Failed to run '{}' health check", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("'{}' health check failed: {}", self.command, stderr);
        }

        Ok(())
    }
}

/// Decode a returned binding: tagged values first, then plain JSON
fn decode_binding(raw: JsonValue) -> Value {
    if let Ok(value) = serde_json::from_value::<Value>(raw.clone()) {
        return value;
    }
    match raw {
        JsonValue::Null => Value::None,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Str(s),
        JsonValue::Array(items) => Value::List(items.into_iter().map(decode_binding).collect()),
        object @ JsonValue::Object(_) => Value::Str(object.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_plain_and_tagged_bindings() {
        assert_eq!(decode_binding(json!(3)), Value::Int(3));
        assert_eq!(decode_binding(json!(2.5)), Value::Float(2.5));
        assert_eq!(decode_binding(json!("x")), Value::Str("x".into()));
        assert_eq!(
            decode_binding(json!([1, null])),
            Value::List(vec![Value::Int(1), Value::None])
        );
        assert_eq!(decode_binding(json!({"type": "int", "value": 7})), Value::Int(7));
        assert_eq!(decode_binding(json!({"a": 1})), Value::Str(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_response_defaults() {
        let response: ExecuteResponse = serde_json::from_str(r#"{"output": "hi\n"}"#).unwrap();
        assert_eq!(response.output, "hi\n");
        assert!(response.variables.is_empty());
        assert!(response.charts.is_empty());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_process_executor_round_trip() {
        // Ignores the request and answers with a fixed response
        let script = r#"cat > /dev/null; printf '%s' '{"output": "42\n", "variables": {"answer": 42}}'"#;
        let executor = ProcessExecutor::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            ExecutionLimits::default(),
        );
        let raw = executor.execute("print(42)", BTreeMap::new()).await.unwrap();
        assert_eq!(raw.stdout, "42\n");
        assert_eq!(raw.bindings["answer"], Value::Int(42));
    }

    #[tokio::test]
    async fn test_process_executor_reports_raised_errors() {
        let script = r#"cat > /dev/null; printf '%s' '{"error": "division by zero", "error_type": "ZeroDivisionError"}'"#;
        let executor = ProcessExecutor::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            ExecutionLimits::default(),
        );
        let err = executor.execute("1/0", BTreeMap::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
    }

    #[tokio::test]
    async fn test_missing_command_is_executor_failure() {
        let executor = ProcessExecutor::new(
            "definitely-not-an-interpreter",
            vec![],
            ExecutionLimits::default(),
        );
        let err = executor.execute("x = 1", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Executor(_)));
    }
}
