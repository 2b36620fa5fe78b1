//! Per-block execution results

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Result of running one code block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "value")]
pub enum ExecutionOutcome {
    /// Chart written to this path
    Artifact(PathBuf),
    /// Block failed with this message
    Failure(String),
}

impl ExecutionOutcome {
    /// Successful outcome
    #[must_use]
    pub fn artifact(path: impl Into<PathBuf>) -> Self {
        Self::Artifact(path.into())
    }

    /// Failed outcome
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    /// Whether the block produced an artifact
    #[inline]
    #[must_use]
    pub fn is_artifact(&self) -> bool {
        matches!(self, Self::Artifact(_))
    }

    /// Artifact path, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Artifact(path) => Some(path),
            Self::Failure(_) => None,
        }
    }

    /// Failure message, if any
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Artifact(_) => None,
            Self::Failure(message) => Some(message),
        }
    }
}
