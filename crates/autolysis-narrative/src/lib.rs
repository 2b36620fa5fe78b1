//! Autolysis Narratives
//!
//! Finds fenced code snippets in generated text and rewrites the text once
//! every snippet has an outcome.
//!
//! - [`SnippetExtractor`]: ordered, non-overlapping [`CodeBlock`]s with spans
//! - [`rewrite`]: one left-to-right pass replacing each span with an image
//!   reference or an error marker
//! - [`narrative_title`]: first level-1 heading of a narrative
//!
//! # Example
//!
//! ```rust
//! use autolysis_narrative::{rewrite, ExecutionOutcome, SnippetExtractor};
//!
//! let text = "A ```python\nplt.plot([1])\n``` B";
//! let blocks = SnippetExtractor::default().extract(text);
//! let outcomes = vec![ExecutionOutcome::artifact("out/graph_1.png")];
//! let rewritten = rewrite(text, &blocks, &outcomes).unwrap();
//! assert_eq!(rewritten, "A ![Graph 1](out/graph_1.png) B");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod extractor;
pub mod markdown;
pub mod outcome;
pub mod rewriter;

pub use error::{ExtractError, RewriteError};
pub use extractor::{CodeBlock, SnippetExtractor, DEFAULT_LANGUAGE};
pub use markdown::narrative_title;
pub use outcome::ExecutionOutcome;
pub use rewriter::{marker, rewrite};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
