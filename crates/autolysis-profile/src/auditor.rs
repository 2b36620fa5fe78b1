//! Size audit
//!
//! Read-only walk that reports collections larger than the log threshold.
//! Purely diagnostic: the audited tree is borrowed, never modified.

use crate::{cardinality, TreeValue};
use serde::{Deserialize, Serialize};

/// Which tree the audit walks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTarget {
    /// The compressed output
    #[default]
    Pruned,
    /// The raw input, before pruning
    Original,
}

/// One oversized collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRecord {
    /// Mapping key or sequence index of the collection
    pub key: String,
    /// JSON pointer to the collection
    pub path: String,
    /// Element count
    pub count: usize,
}

/// Reports collections whose element count exceeds a threshold
#[derive(Debug, Clone, Copy)]
pub struct SizeAuditor {
    threshold: usize,
    max_depth: usize,
}

impl SizeAuditor {
    /// Create auditor with log threshold
    #[inline]
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            max_depth: usize::MAX,
        }
    }

    /// Stop descending into containers nested `max_depth` levels or deeper
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk the tree and collect records in document order
    ///
    /// The root is not reported; it has no key.
    #[must_use]
    pub fn audit(&self, tree: &TreeValue) -> Vec<SizeRecord> {
        let mut records = Vec::new();
        let mut path = String::new();
        self.walk(tree, 0, &mut path, &mut records);
        records
    }

    /// Audit and emit one log line per record
    pub fn audit_and_log(&self, tree: &TreeValue) -> Vec<SizeRecord> {
        let records = self.audit(tree);
        for record in &records {
            tracing::info!(
                key = %record.key,
                path = %record.path,
                count = record.count,
                "Key: {}, Number of values: {}",
                record.key,
                record.count
            );
        }
        records
    }

    fn walk(&self, node: &TreeValue, depth: usize, path: &mut String, records: &mut Vec<SizeRecord>) {
        if depth >= self.max_depth {
            return;
        }
        match node {
            TreeValue::Object(map) => {
                for (key, child) in map {
                    self.visit(key, child, depth, path, records);
                }
            }
            TreeValue::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.visit(&index.to_string(), item, depth, path, records);
                }
            }
            _ => {}
        }
    }

    fn visit(
        &self,
        key: &str,
        child: &TreeValue,
        depth: usize,
        path: &mut String,
        records: &mut Vec<SizeRecord>,
    ) {
        let restore = path.len();
        path.push('/');
        path.push_str(&key.replace('~', "~0").replace('/', "~1"));

        if let Some(count) = cardinality(child).filter(|count| *count > self.threshold) {
            records.push(SizeRecord {
                key: key.to_string(),
                path: path.clone(),
                count,
            });
        }
        self.walk(child, depth + 1, path, records);
        path.truncate(restore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reports_only_above_threshold() {
        let tree = json!({
            "small": [1, 2],
            "edge": [1, 2, 3],
            "big": {"a": 1, "b": 2, "c": 3, "d": 4}
        });
        let records = SizeAuditor::new(3).audit(&tree);
        assert_eq!(
            records,
            vec![SizeRecord {
                key: "big".to_string(),
                path: "/big".to_string(),
                count: 4
            }]
        );
    }

    #[test]
    fn nested_and_sequence_paths() {
        let tree = json!({"outer": [[1, 2, 3], {"inner": [1, 2, 3]}]});
        let records = SizeAuditor::new(2).audit(&tree);
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/outer/0", "/outer/1/inner"]);
        assert_eq!(records[0].key, "0");
    }

    #[test]
    fn root_is_not_reported() {
        let tree = json!([1, 2, 3, 4, 5]);
        assert!(SizeAuditor::new(1).audit(&tree).is_empty());
    }

    #[test]
    fn depth_limit_stops_descent() {
        let tree = json!({"a": [1, 2], "b": {"c": [1, 2], "d": {"e": [1, 2]}}});
        let paths = |auditor: SizeAuditor| -> Vec<String> {
            auditor.audit(&tree).into_iter().map(|r| r.path).collect()
        };
        assert_eq!(paths(SizeAuditor::new(1)), vec!["/a", "/b", "/b/c", "/b/d", "/b/d/e"]);
        assert_eq!(paths(SizeAuditor::new(1).with_max_depth(2)), vec!["/a", "/b", "/b/c", "/b/d"]);
        assert!(paths(SizeAuditor::new(1).with_max_depth(0)).is_empty());
    }

    #[test]
    fn audit_does_not_modify_tree() {
        let tree = json!({"a": [1, 2, 3]});
        let before = tree.clone();
        let _ = SizeAuditor::new(0).audit_and_log(&tree);
        assert_eq!(tree, before);
    }
}
