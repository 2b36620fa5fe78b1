//! Error types for report assembly
//!
//! Every variant here is fatal to the run. Per-block snippet failures never
//! reach this level; they are folded into the rewritten narrative.

use autolysis_narrative::RewriteError;
use autolysis_profile::ProfileCompressionError;
use autolysis_table::TableError;
use std::path::PathBuf;

/// Main report error type
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Missing dataset or output directory
    #[error("input error: {0}")]
    Input(String),

    /// Dataset could not be loaded
    #[error(transparent)]
    Table(#[from] TableError),

    /// Profiling document could not be compressed
    #[error("profile compression failed: {0}")]
    Compression(#[from] ProfileCompressionError),

    /// Text service failed
    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Narrative holds no code blocks and visuals are required
    #[error("narrative contains no python code blocks")]
    EmptyNarrative,

    /// Outcome spans did not line up with the narrative
    #[error("narrative rewrite failed: {0}")]
    Rewrite(#[from] RewriteError),

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Writing an output file failed
    #[error("io error writing {path}: {source}")]
    Io {
        /// Target file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Blocking task did not complete
    #[error("background task failed: {0}")]
    Task(String),
}

impl ReportError {
    /// Create input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for ReportError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Text service failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Token environment variable unset
    #[error("API token not set in environment variable {0}")]
    MissingToken(String),

    /// Connection, timeout or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response without `choices[0].message.content`
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// Whether a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::MissingToken(_) | Self::Malformed(_) => false,
        }
    }
}

/// Configuration file failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File unreadable
    #[error("cannot read {path}: {source}")]
    Read {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Not valid TOML for the config schema
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        let status = |status| GenerationError::Status {
            status,
            body: String::new(),
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(401).is_transient());
        assert!(GenerationError::Transport("reset".into()).is_transient());
        assert!(!GenerationError::Malformed("no choices".into()).is_transient());
    }

    #[test]
    fn generation_error_wraps_into_report_error() {
        let err: ReportError = GenerationError::MissingToken("AIPROXY_TOKEN".into()).into();
        assert_eq!(
            err.to_string(),
            "text generation failed: API token not set in environment variable AIPROXY_TOKEN"
        );
    }
}
