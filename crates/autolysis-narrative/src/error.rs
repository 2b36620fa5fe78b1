//! Error types for narrative rewriting

/// Span bookkeeping inconsistencies found while rewriting
///
/// These indicate a bug in the caller, never a problem with the narrative
/// text itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    /// One outcome per block is required
    #[error("{blocks} code blocks but {outcomes} outcomes")]
    LengthMismatch { blocks: usize, outcomes: usize },

    /// Block starts before the previous block ended
    #[error("block {index} starts at {start} before the previous block ends at {cursor}")]
    OutOfOrder {
        index: usize,
        start: usize,
        cursor: usize,
    },

    /// Span reaches past the end of the narrative
    #[error("block {index} span {start}..{end} exceeds narrative length {len}")]
    OutOfBounds {
        index: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    /// Span offset splits a UTF-8 character
    #[error("block {index} offset {offset} is not on a character boundary")]
    NotCharBoundary { index: usize, offset: usize },
}

impl RewriteError {
    /// Create length mismatch error
    #[must_use]
    pub fn length_mismatch(blocks: usize, outcomes: usize) -> Self {
        Self::LengthMismatch { blocks, outcomes }
    }
}

/// Invalid extractor configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// Fence language tag is empty or contains characters outside `[A-Za-z0-9_+.-]`
    #[error("invalid fence language: '{0}'")]
    InvalidLanguage(String),
}
