//! Resource limits for code execution.
//!
//! Generated code is untrusted, so every executor runs it under:
//! - A code size limit
//! - An output size limit
//! - A wall-clock timeout
//! - A step budget (embedded executor only)
//! - A denylist for dataset paths (to avoid loading secrets)

use std::path::Path;
use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits applied to one execution call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Maximum size of submitted code in bytes (default: 64KB)
    #[serde(default = "default_max_code_bytes")]
    pub max_code_bytes: u64,

    /// Maximum captured output in bytes (default: 1MB)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,

    /// Per-call timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Statements and loop iterations allowed per call (default: 1,000,000)
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Glob patterns for dataset paths that must never be loaded
    #[serde(default = "default_denylist")]
    pub denylist_patterns: Vec<String>,
}

fn default_max_code_bytes() -> u64 {
    64 * 1024
} // 64KB
fn default_max_output_bytes() -> u64 {
    1024 * 1024
} // 1MB
fn default_timeout() -> u64 {
    30
}
fn default_max_steps() -> u64 {
    1_000_000
}

fn default_denylist() -> Vec<String> {
    vec![
        "**/.env*".to_string(),
        "**/secrets*".to_string(),
        "**/*credential*".to_string(),
        "**/*.pem".to_string(),
        "**/*.key".to_string(),
    ]
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_code_bytes: default_max_code_bytes(),
            max_output_bytes: default_max_output_bytes(),
            timeout_seconds: default_timeout(),
            max_steps: default_max_steps(),
            denylist_patterns: default_denylist(),
        }
    }
}

impl ExecutionLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Check if a path matches any denylist pattern
    pub fn is_denylisted(&self, path: &str) -> bool {
        for pattern_str in &self.denylist_patterns {
            if let Ok(pattern) = Pattern::new(pattern_str) {
                if pattern.matches(path) {
                    return true;
                }
            }
        }
        false
    }

    /// Refuse dataset paths on the denylist
    pub fn validate_dataset_path(&self, path: &Path) -> Result<(), SafetyViolation> {
        let path_str = path.to_string_lossy();
        if self.is_denylisted(&path_str) {
            return Err(SafetyViolation::DenylistMatch {
                path: path_str.to_string(),
            });
        }
        Ok(())
    }

    /// Validate code against the size limit
    pub fn validate_code(&self, code: &str) -> Result<(), SafetyViolation> {
        let size = code.len() as u64;
        if size > self.max_code_bytes {
            return Err(SafetyViolation::MaxCodeBytes {
                actual: size,
                limit: self.max_code_bytes,
            });
        }
        Ok(())
    }

    /// Validate output against the size limit
    pub fn validate_output(&self, output: &str) -> Result<(), SafetyViolation> {
        let size = output.len() as u64;
        if size > self.max_output_bytes {
            return Err(SafetyViolation::MaxOutputBytes {
                actual: size,
                limit: self.max_output_bytes,
            });
        }
        Ok(())
    }
}

/// Limit violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyViolation {
    #[error("Code size limit exceeded: {actual} > {limit} bytes")]
    MaxCodeBytes { actual: u64, limit: u64 },

    #[error("Output size limit exceeded: {actual} > {limit} bytes")]
    MaxOutputBytes { actual: u64, limit: u64 },

    #[error("Execution timed out after {limit_seconds}s")]
    Timeout { limit_seconds: u64 },

    #[error("Step budget exhausted after {limit} steps")]
    StepBudget { limit: u64 },

    #[error("Path matches denylist pattern: {path}")]
    DenylistMatch { path: String },
}
