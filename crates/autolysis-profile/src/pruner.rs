//! Recursive tree pruning
//!
//! Depth-first, pre-order transform over a [`TreeValue`]. A node is kept
//! whole or dropped whole; nothing is truncated in place.

use crate::error::ProfileCompressionError;
use crate::policy::CompressionPolicy;
use crate::{cardinality, TreeValue, VARIABLES_KEY};
use serde_json::Map;

/// Counters collected during one pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Container and scalar nodes visited
    pub nodes_visited: usize,
    /// Children removed because their key is in the drop set
    pub dropped_keys: usize,
    /// Containers removed for exceeding the size threshold
    pub dropped_oversized: usize,
    /// Variable-record fields removed by the allow-list
    pub filtered_fields: usize,
}

/// Pruning transform bound to one policy
#[derive(Debug, Clone, Copy)]
pub struct TreePruner<'p> {
    policy: &'p CompressionPolicy,
}

/// Failure bubbling out of the recursion, collecting the path on the way up
struct DepthFailure {
    segments: Vec<String>,
}

impl DepthFailure {
    fn within(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    fn pointer(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .rev()
            .fold(String::new(), |mut acc, segment| {
                acc.push('/');
                acc.push_str(&segment.replace('~', "~0").replace('/', "~1"));
                acc
            })
    }
}

impl<'p> TreePruner<'p> {
    /// Create pruner for policy
    #[inline]
    #[must_use]
    pub fn new(policy: &'p CompressionPolicy) -> Self {
        Self { policy }
    }

    /// Prune a whole document
    ///
    /// The root cannot be dropped, so a root above the size threshold is
    /// rejected instead.
    ///
    /// # Errors
    /// `RootOversized` for a root above `size_threshold`, `DepthExceeded` if
    /// the document nests deeper than `max_depth`.
    pub fn prune(&self, tree: TreeValue) -> Result<(TreeValue, PruneStats), ProfileCompressionError> {
        self.policy.validate()?;
        if let Some(count) = cardinality(&tree).filter(|count| *count > self.policy.size_threshold) {
            return Err(ProfileCompressionError::RootOversized {
                count,
                limit: self.policy.size_threshold,
            });
        }
        let mut stats = PruneStats::default();
        match self.prune_node(tree, 0, &mut stats) {
            Ok(pruned) => Ok((pruned, stats)),
            Err(failure) => Err(ProfileCompressionError::depth_exceeded(
                self.policy.max_depth,
                failure.pointer(),
            )),
        }
    }

    fn prune_node(
        &self,
        value: TreeValue,
        depth: usize,
        stats: &mut PruneStats,
    ) -> Result<TreeValue, DepthFailure> {
        stats.nodes_visited += 1;
        match value {
            TreeValue::Object(mut map) => {
                if depth >= self.policy.max_depth {
                    return Err(DepthFailure { segments: Vec::new() });
                }
                self.restrict_variables(&mut map, stats);

                let mut kept = Map::with_capacity(map.len());
                for (key, child) in map {
                    if self.policy.drops(&key) {
                        stats.dropped_keys += 1;
                        continue;
                    }
                    if self.oversized(&child) {
                        stats.dropped_oversized += 1;
                        continue;
                    }
                    let child = match self.prune_node(child, depth + 1, stats) {
                        Ok(child) => child,
                        Err(failure) => return Err(failure.within(key)),
                    };
                    kept.insert(key, child);
                }
                Ok(TreeValue::Object(kept))
            }
            TreeValue::Array(items) => {
                if depth >= self.policy.max_depth {
                    return Err(DepthFailure { segments: Vec::new() });
                }
                let mut kept = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    if self.oversized(&item) {
                        stats.dropped_oversized += 1;
                        continue;
                    }
                    match self.prune_node(item, depth + 1, stats) {
                        Ok(item) => kept.push(item),
                        Err(failure) => return Err(failure.within(index.to_string())),
                    }
                }
                Ok(TreeValue::Array(kept))
            }
            scalar => Ok(scalar),
        }
    }

    /// Restrict every record under `variables` to the allow-list.
    ///
    /// Runs once at the mapping that owns `variables`, before the generic
    /// recursion reaches that subtree.
    fn restrict_variables(&self, map: &mut Map<String, TreeValue>, stats: &mut PruneStats) {
        let Some(TreeValue::Object(variables)) = map.get_mut(VARIABLES_KEY) else {
            return;
        };
        for record in variables.values_mut() {
            if let TreeValue::Object(fields) = record {
                let before = fields.len();
                fields.retain(|field, _| self.policy.allows(field));
                stats.filtered_fields += before - fields.len();
            }
        }
    }

    /// Size check on the pre-pruning count
    #[inline]
    fn oversized(&self, value: &TreeValue) -> bool {
        cardinality(value).is_some_and(|count| count > self.policy.size_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn policy() -> CompressionPolicy {
        CompressionPolicy::new()
            .with_allow_list(["mean", "n", "first_rows"])
            .with_drop_keys(["histogram", "sample"])
            .with_size_threshold(3)
    }

    #[test]
    fn scalars_pass_through() {
        let policy = policy();
        let (out, _) = TreePruner::new(&policy).prune(json!(42)).unwrap();
        assert_eq!(out, json!(42));
    }

    #[test]
    fn drop_keys_removed_at_any_depth() {
        let policy = policy();
        let tree = json!({
            "table": {"histogram": [1], "nested": {"sample": {"a": 1}, "keep": true}},
            "histogram": 5
        });
        let (out, stats) = TreePruner::new(&policy).prune(tree).unwrap();
        assert_eq!(out, json!({"table": {"nested": {"keep": true}}}));
        assert_eq!(stats.dropped_keys, 3);
    }

    #[test]
    fn oversized_children_dropped_whole() {
        let policy = policy();
        let tree = json!({
            "big": [1, 2, 3, 4],
            "edge": [1, 2, 3],
            "list": [[1, 2, 3, 4], {"a": 1}]
        });
        let (out, stats) = TreePruner::new(&policy).prune(tree).unwrap();
        assert_eq!(out, json!({"edge": [1, 2, 3], "list": [{"a": 1}]}));
        assert_eq!(stats.dropped_oversized, 2);
    }

    #[test]
    fn size_uses_pre_pruning_count() {
        // Four children, three of which would be dropped: still rejected.
        let policy = policy();
        let tree = json!({"wrapper": {"histogram": 1, "sample": 2, "x": 3, "y": 4}});
        let (out, _) = TreePruner::new(&policy).prune(tree).unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn empty_containers_kept() {
        let policy = policy().with_size_threshold(2);
        let tree = json!({"a": [{}, []], "c": [1, 2, 3]});
        let (out, _) = TreePruner::new(&policy).prune(tree).unwrap();
        assert_eq!(out, json!({"a": [{}, []]}));

        let strict = policy.with_size_threshold(0);
        let (out, _) = TreePruner::new(&strict).prune(json!({})).unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn oversized_root_is_rejected() {
        let policy = policy();
        let err = TreePruner::new(&policy).prune(json!([1, 2, 3, 4, 5])).unwrap_err();
        assert_eq!(err, ProfileCompressionError::RootOversized { count: 5, limit: 3 });

        let map = json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5});
        assert!(matches!(
            TreePruner::new(&policy).prune(map),
            Err(ProfileCompressionError::RootOversized { count: 5, .. })
        ));

        let (out, _) = TreePruner::new(&policy).prune(json!([1, 2, 3])).unwrap();
        assert_eq!(out, json!([1, 2, 3]));
    }

    #[test]
    fn variables_restricted_to_allow_list() {
        let policy = policy();
        let tree = json!({
            "variables": {
                "age": {"mean": 30, "std": 2.5, "first_rows": {"histogram": 1, "x": 2}},
                "name": {"n": 3, "type": "Text"},
                "odd": 7
            }
        });
        let (out, stats) = TreePruner::new(&policy).prune(tree).unwrap();
        assert_eq!(
            out,
            json!({
                "variables": {
                    "age": {"mean": 30, "first_rows": {"x": 2}},
                    "name": {"n": 3},
                    "odd": 7
                }
            })
        );
        assert_eq!(stats.filtered_fields, 2);
    }

    #[test]
    fn nested_variables_mapping_also_restricted() {
        let policy = policy();
        let tree = json!({"report": {"variables": {"v": {"mean": 1, "kurtosis": 0}}}});
        let (out, _) = TreePruner::new(&policy).prune(tree).unwrap();
        assert_eq!(out, json!({"report": {"variables": {"v": {"mean": 1}}}}));
    }

    #[test]
    fn depth_limit_reports_pointer() {
        let policy = policy().with_max_depth(2);
        let tree = json!({"a": {"b/c": {"d": 1}}});
        let err = TreePruner::new(&policy).prune(tree).unwrap_err();
        assert_eq!(err, ProfileCompressionError::depth_exceeded(2, "/a/b~1c"));
    }

    #[test]
    fn key_order_preserved() {
        let policy = policy();
        let tree = json!({"z": 1, "a": 2, "m": 3});
        let (out, _) = TreePruner::new(&policy).prune(tree).unwrap();
        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
