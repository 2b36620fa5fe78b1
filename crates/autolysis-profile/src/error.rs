//! Error types for profile compression

/// Traversal failure while compressing a profiling document
///
/// A failed compression yields no output; callers treat it as fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileCompressionError {
    /// Nesting deeper than the configured limit
    #[error("document nesting exceeds maximum depth {max_depth} at {path}")]
    DepthExceeded {
        /// Configured limit
        max_depth: usize,
        /// JSON pointer of the offending node
        path: String,
    },

    /// Root collection larger than the size threshold
    #[error("root collection has {count} elements, size threshold is {limit}")]
    RootOversized {
        /// Element count of the root
        count: usize,
        /// Configured size threshold
        limit: usize,
    },

    /// Policy values that cannot produce a bounded document
    #[error("invalid compression policy: {0}")]
    InvalidPolicy(String),
}

impl ProfileCompressionError {
    /// Create depth error for path
    pub fn depth_exceeded(max_depth: usize, path: impl Into<String>) -> Self {
        Self::DepthExceeded {
            max_depth,
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_error_display() {
        let err = ProfileCompressionError::depth_exceeded(4, "/a/b");
        assert_eq!(
            err.to_string(),
            "document nesting exceeds maximum depth 4 at /a/b"
        );
    }

    #[test]
    fn root_error_display() {
        let err = ProfileCompressionError::RootOversized { count: 5, limit: 3 };
        assert_eq!(err.to_string(), "root collection has 5 elements, size threshold is 3");
    }
}
