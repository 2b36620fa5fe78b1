//! Autolysis Profile Compression
//!
//! Turns an unbounded, deeply nested profiling document into a bounded
//! document that is safe to hand to a downstream text generator.
//!
//! # Core Operations
//!
//! - **Prune**: drop excluded keys and oversized collections, restrict
//!   per-variable records to an allow-list ([`TreePruner`])
//! - **Audit**: report collections above a logging threshold without
//!   touching the tree ([`SizeAuditor`])
//! - **Compress**: both of the above for one document ([`ProfileCompressor`])
//!
//! # Example
//!
//! ```rust
//! use autolysis_profile::{CompressionPolicy, ProfileCompressor};
//! use serde_json::json;
//!
//! let policy = CompressionPolicy::new()
//!     .with_allow_list(["mean"])
//!     .with_size_threshold(510);
//! let compressor = ProfileCompressor::new(policy);
//!
//! let raw = json!({"variables": {"age": {"mean": 30, "histogram": [1, 2]}}});
//! let compressed = compressor.compress(raw).unwrap();
//! assert_eq!(compressed, json!({"variables": {"age": {"mean": 30}}}));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod auditor;
pub mod compressor;
pub mod error;
pub mod policy;
pub mod pruner;

pub use auditor::{AuditTarget, SizeAuditor, SizeRecord};
pub use compressor::{CompressedProfile, ProfileCompressor};
pub use error::ProfileCompressionError;
pub use policy::{CompressionPolicy, DEFAULT_ALLOW_LIST, DEFAULT_DROP_KEYS};
pub use pruner::{PruneStats, TreePruner};

/// Generic nested document: mapping / ordered sequence / scalar.
pub type TreeValue = serde_json::Value;

/// Key whose mapping children are restricted to the allow-list.
pub const VARIABLES_KEY: &str = "variables";

/// Element count of a container node; `None` for scalars.
#[inline]
#[must_use]
pub fn cardinality(value: &TreeValue) -> Option<usize> {
    match value {
        TreeValue::Object(map) => Some(map.len()),
        TreeValue::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
