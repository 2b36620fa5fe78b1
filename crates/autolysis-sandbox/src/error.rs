//! Error types for snippet execution
//!
//! Every variant is recoverable: the runner turns it into a failure outcome
//! for the one block that raised it.

use std::path::PathBuf;
use std::time::Duration;

/// Reasons a single snippet fails
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnippetError {
    /// Snippet does not parse
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Construct outside the supported subset
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Explicit `raise`
    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },

    /// Unbound name
    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    /// Operation applied to the wrong kind of value
    #[error("TypeError: {0}")]
    Type(String),

    /// Right kind of value, wrong content
    #[error("ValueError: {0}")]
    Value(String),

    /// Missing column or dictionary key
    #[error("KeyError: {0}")]
    Key(String),

    /// Missing attribute or method
    #[error("AttributeError: {0}")]
    Attribute(String),

    /// Position out of range
    #[error("IndexError: {0}")]
    Index(String),

    /// Division by zero
    #[error("ZeroDivisionError: division by zero")]
    ZeroDivision,

    /// Sequence would exceed the configured element limit
    #[error("sequence of {len} elements exceeds the limit of {limit}")]
    TooLarge { len: usize, limit: usize },

    /// Wall-clock budget exhausted
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Runner stopped waiting for the block
    #[error("execution cancelled")]
    Cancelled,

    /// Worker thread ended without reporting
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// Block finished without an open figure
    #[error("block produced no figure")]
    NoFigure,

    /// PNG encoding or writing failed
    #[error("failed to render {path}: {message}")]
    Render { path: PathBuf, message: String },

    /// Output directory missing
    #[error("output directory {0} does not exist")]
    OutputDir(PathBuf),

    /// Grammar could not be loaded
    #[error("parser error: {0}")]
    Parser(String),
}

impl SnippetError {
    /// Create unsupported-construct error
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Create type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Create value error
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }

    /// Create attribute error for a type and attribute name
    pub fn attribute(type_name: &str, attribute: &str) -> Self {
        Self::Attribute(format!("'{type_name}' object has no attribute '{attribute}'"))
    }

    /// Create render error for path
    pub fn render(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Render {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the block ran out of time or was cancelled
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(
            SnippetError::Raised {
                kind: "ValueError".into(),
                message: "bad".into()
            }
            .to_string(),
            "ValueError: bad"
        );
        assert_eq!(
            SnippetError::Name("x".into()).to_string(),
            "NameError: name 'x' is not defined"
        );
        assert_eq!(
            SnippetError::attribute("Series", "foo").to_string(),
            "AttributeError: 'Series' object has no attribute 'foo'"
        );
        assert!(SnippetError::Timeout(Duration::from_secs(1)).is_timeout());
    }
}
