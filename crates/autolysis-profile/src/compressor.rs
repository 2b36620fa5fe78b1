//! Profile compression entry point
//!
//! Composes [`TreePruner`] and [`SizeAuditor`] for one profiling document.
//! Failures are caught once here, logged, and yield no output.

use crate::auditor::{AuditTarget, SizeAuditor, SizeRecord};
use crate::error::ProfileCompressionError;
use crate::policy::CompressionPolicy;
use crate::pruner::{PruneStats, TreePruner};
use crate::TreeValue;

/// Compressed document together with its diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedProfile {
    /// The bounded document
    pub tree: TreeValue,
    /// Oversized collections seen by the audit
    pub audit: Vec<SizeRecord>,
    /// Pruning counters
    pub stats: PruneStats,
}

/// Prunes and audits profiling documents
#[derive(Debug, Clone, Default)]
pub struct ProfileCompressor {
    policy: CompressionPolicy,
}

impl ProfileCompressor {
    /// Create compressor with policy
    #[inline]
    #[must_use]
    pub fn new(policy: CompressionPolicy) -> Self {
        Self { policy }
    }

    /// Active policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }

    /// Compress a document, discarding diagnostics
    ///
    /// # Errors
    /// Any traversal failure; the caller must treat it as fatal.
    pub fn compress(&self, tree: TreeValue) -> Result<TreeValue, ProfileCompressionError> {
        self.compress_with_audit(tree).map(|compressed| compressed.tree)
    }

    /// Compress a document and keep the audit records
    ///
    /// # Errors
    /// Any traversal failure; the caller must treat it as fatal.
    pub fn compress_with_audit(
        &self,
        tree: TreeValue,
    ) -> Result<CompressedProfile, ProfileCompressionError> {
        let auditor = SizeAuditor::new(self.policy.log_threshold).with_max_depth(self.policy.max_depth);
        let original_audit = match self.policy.audit_target {
            AuditTarget::Original => Some(auditor.audit_and_log(&tree)),
            AuditTarget::Pruned => None,
        };

        let (pruned, stats) = TreePruner::new(&self.policy).prune(tree).map_err(|e| {
            tracing::error!("An unexpected error occurred: {e}");
            e
        })?;

        let audit = match original_audit {
            Some(records) => records,
            None => auditor.audit_and_log(&pruned),
        };

        tracing::debug!(
            visited = stats.nodes_visited,
            dropped_keys = stats.dropped_keys,
            dropped_oversized = stats.dropped_oversized,
            filtered_fields = stats.filtered_fields,
            "profile compressed"
        );

        Ok(CompressedProfile {
            tree: pruned,
            audit,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn reference_scenario() {
        let compressor = ProfileCompressor::new(
            CompressionPolicy::new()
                .with_allow_list(["mean"])
                .with_size_threshold(510),
        );
        let blob: Vec<u32> = (0..=1000).collect();
        let other: Vec<u32> = (0..600).collect();
        let tree = json!({
            "variables": {"age": {"mean": 30, "huge_blob": blob}},
            "other": other
        });

        let out = compressor.compress(tree).unwrap();
        assert_eq!(out, json!({"variables": {"age": {"mean": 30}}}));
    }

    #[test]
    fn audit_target_original_sees_dropped_collections() {
        let policy = CompressionPolicy::new()
            .with_size_threshold(2)
            .with_log_threshold(2)
            .with_audit_target(AuditTarget::Original);
        let tree = json!({"big": [1, 2, 3]});

        let compressed = ProfileCompressor::new(policy).compress_with_audit(tree).unwrap();
        assert_eq!(compressed.tree, json!({}));
        assert_eq!(compressed.audit.len(), 1);
        assert_eq!(compressed.audit[0].key, "big");
    }

    #[test]
    fn audit_on_pruned_tree_never_exceeds_size_threshold() {
        let policy = CompressionPolicy::new().with_size_threshold(5).with_log_threshold(1);
        let tree = json!({"a": [1, 2, 3], "b": [1, 2, 3, 4, 5, 6]});

        let compressed = ProfileCompressor::new(policy).compress_with_audit(tree).unwrap();
        assert_eq!(compressed.audit.len(), 1);
        assert_eq!(compressed.audit[0].count, 3);
    }

    #[test]
    fn audit_does_not_change_output() {
        let tree = json!({"x": [1, 2, 3, 4], "sample": 1});
        let quiet = ProfileCompressor::new(CompressionPolicy::new().with_log_threshold(usize::MAX));
        let loud = ProfileCompressor::new(CompressionPolicy::new().with_log_threshold(0));
        assert_eq!(
            quiet.compress(tree.clone()).unwrap(),
            loud.compress(tree).unwrap()
        );
    }

    #[test]
    fn deep_original_audit_fails_on_depth() {
        let mut tree = json!([1, 2]);
        for _ in 0..3000 {
            tree = TreeValue::Array(vec![tree]);
        }
        let policy = CompressionPolicy::new()
            .with_log_threshold(1)
            .with_max_depth(64)
            .with_audit_target(AuditTarget::Original);
        let result = ProfileCompressor::new(policy).compress_with_audit(tree);
        assert!(matches!(
            result,
            Err(ProfileCompressionError::DepthExceeded { max_depth: 64, .. })
        ));
    }

    #[test]
    fn oversized_root_yields_no_output() {
        let compressor = ProfileCompressor::new(CompressionPolicy::new().with_size_threshold(3));
        assert!(matches!(
            compressor.compress_with_audit(json!({"a": 1, "b": 2, "c": 3, "d": 4})),
            Err(ProfileCompressionError::RootOversized { count: 4, limit: 3 })
        ));
    }

    #[test]
    fn failure_yields_no_output() {
        let compressor = ProfileCompressor::new(CompressionPolicy::new().with_max_depth(1));
        let result = compressor.compress(json!({"a": {"b": 1}}));
        assert!(matches!(
            result,
            Err(ProfileCompressionError::DepthExceeded { .. })
        ));
    }
}
