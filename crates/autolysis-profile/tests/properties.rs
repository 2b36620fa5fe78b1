//! Property tests for profile compression
//!
//! Arbitrary nested documents, checked exhaustively after compression.

use autolysis_profile::{cardinality, CompressionPolicy, ProfileCompressionError, ProfileCompressor, TreeValue};
use proptest::prelude::*;
use serde_json::{json, Map};

const KEYS: &[&str] = &[
    "variables", "mean", "std", "n", "histogram", "sample", "table", "alerts", "x", "y",
];

fn policy() -> CompressionPolicy {
    CompressionPolicy::new()
        .with_allow_list(["mean", "n", "x"])
        .with_drop_keys(["histogram", "sample"])
        .with_size_threshold(4)
}

fn scalar() -> impl Strategy<Value = TreeValue> {
    prop_oneof![
        Just(TreeValue::Null),
        any::<bool>().prop_map(TreeValue::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(TreeValue::String),
    ]
}

fn tree() -> impl Strategy<Value = TreeValue> {
    scalar().prop_recursive(5, 96, 7, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..7).prop_map(TreeValue::Array),
            proptest::collection::vec((proptest::sample::select(KEYS), inner), 0..7).prop_map(
                |entries| {
                    let mut map = Map::new();
                    for (key, value) in entries {
                        map.insert(key.to_string(), value);
                    }
                    TreeValue::Object(map)
                }
            ),
        ]
    })
}

fn any_dropped_key(value: &TreeValue, policy: &CompressionPolicy) -> bool {
    match value {
        TreeValue::Object(map) => map
            .iter()
            .any(|(k, v)| policy.drops(k) || any_dropped_key(v, policy)),
        TreeValue::Array(items) => items.iter().any(|v| any_dropped_key(v, policy)),
        _ => false,
    }
}

fn max_cardinality(value: &TreeValue) -> usize {
    let children: Vec<&TreeValue> = match value {
        TreeValue::Object(map) => map.values().collect(),
        TreeValue::Array(items) => items.iter().collect(),
        _ => return 0,
    };
    let own = children.len();
    children.into_iter().map(max_cardinality).fold(own, usize::max)
}

fn root_within(value: &TreeValue, policy: &CompressionPolicy) -> bool {
    cardinality(value).map_or(true, |count| count <= policy.size_threshold)
}

fn variables_respect_allow_list(value: &TreeValue, policy: &CompressionPolicy) -> bool {
    match value {
        TreeValue::Object(map) => {
            if let Some(TreeValue::Object(variables)) = map.get("variables") {
                let records_ok = variables.values().all(|record| match record {
                    TreeValue::Object(fields) => fields.keys().all(|k| policy.allows(k)),
                    _ => true,
                });
                if !records_ok {
                    return false;
                }
            }
            map.values().all(|v| variables_respect_allow_list(v, policy))
        }
        TreeValue::Array(items) => items.iter().all(|v| variables_respect_allow_list(v, policy)),
        _ => true,
    }
}

proptest! {
    #[test]
    fn prop_no_drop_key_survives(input in tree()) {
        let policy = policy();
        prop_assume!(root_within(&input, &policy));
        let out = ProfileCompressor::new(policy.clone()).compress(input).unwrap();
        prop_assert!(!any_dropped_key(&out, &policy));
    }

    #[test]
    fn prop_every_container_within_threshold(input in tree()) {
        let policy = policy();
        match ProfileCompressor::new(policy.clone()).compress(input.clone()) {
            Ok(out) => prop_assert!(max_cardinality(&out) <= policy.size_threshold),
            Err(err) => {
                prop_assert!(!root_within(&input, &policy));
                let is_root_error = matches!(err, ProfileCompressionError::RootOversized { .. });
                prop_assert!(is_root_error);
            }
        }
    }

    #[test]
    fn prop_variables_only_allowed_fields(input in tree()) {
        let policy = policy();
        prop_assume!(root_within(&input, &policy));
        let out = ProfileCompressor::new(policy.clone()).compress(input).unwrap();
        prop_assert!(variables_respect_allow_list(&out, &policy));
    }

    #[test]
    fn prop_compression_is_idempotent(input in tree()) {
        prop_assume!(root_within(&input, &policy()));
        let compressor = ProfileCompressor::new(policy());
        let once = compressor.compress(input).unwrap();
        let twice = compressor.compress(once.clone()).unwrap();
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn reference_profile_keeps_only_allowed_mean() {
    let compressor = ProfileCompressor::new(
        CompressionPolicy::new()
            .with_allow_list(["mean"])
            .with_size_threshold(510),
    );
    let out = compressor.compress(autolysis_test_utils::oversized_profile()).unwrap();
    assert_eq!(out, json!({"variables": {"age": {"mean": 30}}}));
}

#[test]
fn root_above_threshold_is_rejected() {
    let compressor = ProfileCompressor::new(policy());
    assert_eq!(
        compressor.compress(json!([1, 2, 3, 4, 5])),
        Err(ProfileCompressionError::RootOversized { count: 5, limit: 4 })
    );
    let out = compressor.compress(json!({"x": [1, 2, 3, 4], "y": [1, 2, 3, 4, 5]})).unwrap();
    assert_eq!(max_cardinality(&out), 4);
}

#[test]
fn wrapped_variables_restricted() {
    let compressor = ProfileCompressor::new(policy());
    let out = compressor
        .compress(json!({"outer": [{"variables": {"v": {"mean": 1, "std": 2, "y": {"x": 1}}}}]}))
        .unwrap();
    assert_eq!(out, json!({"outer": [{"variables": {"v": {"mean": 1}}}]}));
}
