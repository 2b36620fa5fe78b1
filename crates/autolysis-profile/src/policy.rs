//! Compression policy
//!
//! Holds the allow-list, drop-key set and cardinality thresholds. All sets
//! are immutable once the compressor is built.

use crate::auditor::AuditTarget;
use crate::error::ProfileCompressionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fields permitted to survive in each per-variable record.
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "n_distinct",
    "p_distinct",
    "is_unique",
    "n_unique",
    "p_unique",
    "type",
    "hashable",
    "ordering",
    "n_missing",
    "n",
    "p_missing",
    "count",
    "memory_size",
    "first_rows",
    "max_length",
    "mean_length",
    "median_length",
    "min_length",
    "n_characters_distinct",
    "n_characters",
    "n_negative",
    "p_negative",
    "n_infinite",
    "n_zeros",
    "mean",
    "std",
    "variance",
    "min",
    "max",
    "kurtosis",
    "skewness",
    "sum",
    "mad",
    "chi_squared",
    "statistic",
    "pvalue",
    "range",
    "5%",
    "25%",
    "50%",
    "75%",
    "95%",
    "iqr",
    "cv",
    "p_zeros",
    "p_infinite",
    "monotonic_increase",
    "monotonic_decrease",
    "monotonic_increase_strict",
    "monotonic_decrease_strict",
    "monotonic",
    "cast_type",
];

/// Keys removed wherever they occur.
pub const DEFAULT_DROP_KEYS: &[&str] = &[
    "missing",
    "value_counts_without_nan",
    "value_counts_index_sorted",
    "histogram",
    "scatter",
    "analysis",
    "sample",
    "package",
    "duplicates",
    "bar",
    "matrix",
    "time_index_analysis",
];

/// Policy applied by [`crate::ProfileCompressor`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionPolicy {
    /// Keys retained in records under `variables`
    pub allow_list: BTreeSet<String>,
    /// Keys dropped at any depth
    pub drop_keys: BTreeSet<String>,
    /// Containers with more elements than this are dropped whole
    pub size_threshold: usize,
    /// Containers with more elements than this are reported by the audit
    pub log_threshold: usize,
    /// Which tree the audit walks
    pub audit_target: AuditTarget,
    /// Nesting limit for traversal
    pub max_depth: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            allow_list: DEFAULT_ALLOW_LIST.iter().map(|k| (*k).to_string()).collect(),
            drop_keys: DEFAULT_DROP_KEYS.iter().map(|k| (*k).to_string()).collect(),
            size_threshold: 510,
            log_threshold: 10,
            audit_target: AuditTarget::Pruned,
            max_depth: 512,
        }
    }
}

impl CompressionPolicy {
    /// Create default policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the allow-list
    #[must_use]
    pub fn with_allow_list<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the drop-key set
    #[must_use]
    pub fn with_drop_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drop_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// With size threshold
    #[inline]
    #[must_use]
    pub fn with_size_threshold(mut self, threshold: usize) -> Self {
        self.size_threshold = threshold;
        self
    }

    /// With log threshold
    #[inline]
    #[must_use]
    pub fn with_log_threshold(mut self, threshold: usize) -> Self {
        self.log_threshold = threshold;
        self
    }

    /// With audit target
    #[inline]
    #[must_use]
    pub fn with_audit_target(mut self, target: AuditTarget) -> Self {
        self.audit_target = target;
        self
    }

    /// With maximum traversal depth
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Check the policy can be applied
    ///
    /// # Errors
    /// `InvalidPolicy` when `max_depth` is zero.
    pub fn validate(&self) -> Result<(), ProfileCompressionError> {
        if self.max_depth == 0 {
            return Err(ProfileCompressionError::InvalidPolicy(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a variable-record field survives
    #[inline]
    #[must_use]
    pub fn allows(&self, key: &str) -> bool {
        self.allow_list.contains(key)
    }

    /// Whether a key is removed everywhere
    #[inline]
    #[must_use]
    pub fn drops(&self, key: &str) -> bool {
        self.drop_keys.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_sets() {
        let policy = CompressionPolicy::default();
        assert_eq!(policy.allow_list.len(), DEFAULT_ALLOW_LIST.len());
        assert!(policy.allows("mean"));
        assert!(policy.allows("95%"));
        assert!(!policy.allows("histogram"));
        assert!(policy.drops("histogram"));
        assert!(policy.drops("time_index_analysis"));
        assert_eq!(policy.size_threshold, 510);
        assert_eq!(policy.log_threshold, 10);
    }

    #[test]
    fn builder_overrides() {
        let policy = CompressionPolicy::new()
            .with_allow_list(["mean"])
            .with_drop_keys(Vec::<String>::new())
            .with_size_threshold(3);

        assert!(policy.allows("mean"));
        assert!(!policy.allows("std"));
        assert!(policy.drop_keys.is_empty());
        assert_eq!(policy.size_threshold, 3);
    }

    #[test]
    fn zero_depth_rejected() {
        let policy = CompressionPolicy::new().with_max_depth(0);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn partial_deserialize_keeps_defaults() {
        let policy: CompressionPolicy =
            serde_json::from_str(r#"{"size_threshold": 100}"#).unwrap();
        assert_eq!(policy.size_threshold, 100);
        assert!(policy.drops("sample"));
    }
}
