//! Error types for dataset loading

use std::path::PathBuf;

/// Errors while loading or building a table
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// Dataset file does not exist
    #[error("file {0} does not exist")]
    NotFound(PathBuf),

    /// IO error while reading
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV content
    #[error("error loading CSV file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Columns of different lengths or duplicate names
    #[error("invalid table shape: {0}")]
    Shape(String),
}

impl TableError {
    /// Create CSV error for path
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = TableError::NotFound(PathBuf::from("data.csv"));
        assert_eq!(err.to_string(), "file data.csv does not exist");
    }
}
