//! Glue between model replies and the orchestrator.
//!
//! Generated code arrives inside a ```` ```python ```` fence. A reply without
//! one is not executed; the request layer answers with a clarification
//! instead.

use thiserror::Error;

use super::orchestrator::TaskError;

const FENCE_OPEN: &str = "```python";
const FENCE_CLOSE: &str = "```";

/// Text returned in place of empty output
pub const NO_OUTPUT: &str = "No textual output.";

/// Outcome of looking for code in a model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeExtraction {
    Code(String),
    Missing,
}

/// Extract the first fenced python block, trimmed; an empty block counts as missing
pub fn extract_code(reply: &str) -> CodeExtraction {
    let Some(start) = reply.find(FENCE_OPEN) else {
        return CodeExtraction::Missing;
    };
    let body = &reply[start + FENCE_OPEN.len()..];
    let Some(end) = body.find(FENCE_CLOSE) else {
        return CodeExtraction::Missing;
    };
    let code = body[..end].trim();
    if code.is_empty() {
        CodeExtraction::Missing
    } else {
        CodeExtraction::Code(code.to_string())
    }
}

/// Technical result shown next to the answer
pub fn technical_details(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Errors surfaced to the caller of an analysis request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("No CSV uploaded yet.")]
    NoDataset,

    #[error("Failed to load dataset: {0}")]
    BadDataset(String),

    #[error("I couldn't generate an analysis for your question.")]
    NoCode {
        question: String,
        suggestions: Option<String>,
    },

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl RequestError {
    /// User-input errors are the caller's to fix
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Upstream(_))
    }

    /// HTTP-style status for the request layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoDataset => 404,
            Self::BadDataset(_) | Self::NoCode { .. } => 400,
            Self::Upstream(_) => 500,
        }
    }
}

impl From<TaskError> for RequestError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Dataset { .. } => Self::BadDataset(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_fenced_code() {
        let reply = "Here you go:\n```python\nprint(df['x'].mean())\n```\nDone.";
        assert_eq!(
            extract_code(reply),
            CodeExtraction::Code("print(df['x'].mean())".to_string())
        );
    }

    #[test]
    fn test_first_block_wins() {
        let reply = "```python\na = 1\n```\n```python\nb = 2\n```";
        assert_eq!(extract_code(reply), CodeExtraction::Code("a = 1".to_string()));
    }

    #[test]
    fn test_missing_or_empty_code() {
        assert_eq!(extract_code("I am not sure what you mean."), CodeExtraction::Missing);
        assert_eq!(extract_code("```python\n   \n```"), CodeExtraction::Missing);
        assert_eq!(extract_code("```python\nunterminated"), CodeExtraction::Missing);
        assert_eq!(extract_code("```\nprint(1)\n```"), CodeExtraction::Missing);
    }

    #[test]
    fn test_technical_details() {
        assert_eq!(technical_details("  7.0\n"), "7.0");
        assert_eq!(technical_details("\n"), NO_OUTPUT);
    }

    #[test]
    fn test_error_classification() {
        assert!(RequestError::NoDataset.is_client_error());
        assert_eq!(RequestError::NoDataset.status_code(), 404);
        let no_code = RequestError::NoCode {
            question: "why?".into(),
            suggestions: Some("Try asking for the average price.".into()),
        };
        assert!(no_code.is_client_error());
        assert_eq!(no_code.status_code(), 400);
        assert!(!RequestError::Upstream("timeout".into()).is_client_error());

        let err: RequestError = TaskError::Dataset {
            variable: "df".into(),
            message: "not found".into(),
        }
        .into();
        assert_eq!(err.status_code(), 400);
    }
}
