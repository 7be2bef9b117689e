//! Errors raised by analysis scripts.
//!
//! Display strings follow the messages data-analysis code usually expects
//! (`division by zero`, `name 'x' is not defined`, ...) because the message
//! is what gets handed back to the user as the answer of a failed turn.

use thiserror::Error;

/// Result alias for script evaluation
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

/// An error raised while lexing, parsing or evaluating a script
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("invalid syntax (<string>, line {line})")]
    Syntax { line: usize, detail: String },

    #[error("unindent does not match any outer indentation level (<string>, line {line})")]
    Indentation { line: usize },

    #[error("name '{0}' is not defined")]
    NameError(String),

    #[error("'{0}'")]
    KeyError(String),

    #[error("'{type_name}' object has no attribute '{attribute}'")]
    AttributeError {
        type_name: String,
        attribute: String,
    },

    #[error("{0}")]
    TypeError(String),

    #[error("{0}")]
    ValueError(String),

    #[error("{0}")]
    ZeroDivision(String),

    #[error("{0}")]
    IndexError(String),

    /// A string or list would grow past the sequence cap
    #[error("{0}")]
    MemoryError(String),

    /// Raised explicitly by the script (`raise Kind("message")`)
    #[error("{message}")]
    Raised { kind: String, message: String },

    #[error("step budget exhausted after {limit} steps")]
    StepLimit { limit: u64 },
}

impl ScriptError {
    /// The exception class name this error corresponds to
    pub fn kind(&self) -> &str {
        match self {
            Self::Syntax { .. } => "SyntaxError",
            Self::Indentation { .. } => "IndentationError",
            Self::NameError(_) => "NameError",
            Self::KeyError(_) => "KeyError",
            Self::AttributeError { .. } => "AttributeError",
            Self::TypeError(_) => "TypeError",
            Self::ValueError(_) => "ValueError",
            Self::ZeroDivision(_) => "ZeroDivisionError",
            Self::IndexError(_) => "IndexError",
            Self::MemoryError(_) => "MemoryError",
            Self::Raised { kind, .. } => kind,
            Self::StepLimit { .. } => "StepLimitExceeded",
        }
    }

    pub(crate) fn syntax(line: usize, detail: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            detail: detail.into(),
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    pub(crate) fn no_attribute(type_name: &str, attribute: &str) -> Self {
        Self::AttributeError {
            type_name: type_name.to_string(),
            attribute: attribute.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_exception_strings() {
        assert_eq!(
            ScriptError::ZeroDivision("division by zero".into()).to_string(),
            "division by zero"
        );
        assert_eq!(
            ScriptError::NameError("foo".into()).to_string(),
            "name 'foo' is not defined"
        );
        assert_eq!(ScriptError::KeyError("price".into()).to_string(), "'price'");
        assert_eq!(
            ScriptError::syntax(3, "unexpected token").to_string(),
            "invalid syntax (<string>, line 3)"
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            ScriptError::ZeroDivision("division by zero".into()).kind(),
            "ZeroDivisionError"
        );
        let raised = ScriptError::Raised {
            kind: "ValueError".into(),
            message: "bad".into(),
        };
        assert_eq!(raised.kind(), "ValueError");
        assert_eq!(raised.to_string(), "bad");
    }
}
