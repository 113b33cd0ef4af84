//! Property-based tests for dot-path records.

use dotkv::path::{get, set, unset};
use dotkv::{KvClient, MemoryStore};
use proptest::prelude::*;
use serde_json::{json, Value};

/// A single path segment.
fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,5}"
}

/// A dotted key of one to four segments.
fn arb_key() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..=4).prop_map(|segments| segments.join("."))
}

/// Leaf values; floats are kept finite.
fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1.0e9f64..1.0e9).prop_map(|f| json!(f)),
        "[ -~]{0,12}".prop_map(Value::String),
    ]
}

/// Arbitrary nested values.
fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(arb_segment(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn test_store_then_retrieve(key in arb_key(), value in arb_value()) {
        let kv = KvClient::new(MemoryStore::new());

        kv.store(&key, value.clone()).unwrap();

        prop_assert_eq!(kv.retrieve(&key).unwrap(), Some(value));
        prop_assert!(kv.exists(&key).unwrap());
    }

    #[test]
    fn test_store_keeps_siblings(
        root in arb_segment(),
        first in arb_value(),
        second in arb_value()
    ) {
        let kv = KvClient::new(MemoryStore::new());
        let left = format!("{}.left", root);
        let right = format!("{}.right", root);

        kv.store(&left, first.clone()).unwrap();
        kv.store(&right, second.clone()).unwrap();

        prop_assert_eq!(kv.retrieve(&left).unwrap(), Some(first));
        prop_assert_eq!(kv.retrieve(&right).unwrap(), Some(second));
        prop_assert_eq!(kv.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_increments_sum(amounts in prop::collection::vec(-1000i64..1000, 1..20)) {
        let kv = KvClient::new(MemoryStore::new());

        for amount in &amounts {
            kv.increment("counter.total", *amount).unwrap();
        }

        let expected: i64 = amounts.iter().sum();
        prop_assert_eq!(kv.retrieve("counter.total").unwrap(), Some(json!(expected)));
    }

    #[test]
    fn test_set_then_get(base in arb_value(), key in arb_key(), value in arb_value()) {
        let updated = set(&base, &key, value.clone());
        prop_assert_eq!(get(&updated, &key), Some(&value));
    }

    #[test]
    fn test_set_does_not_touch_input(base in arb_value(), key in arb_key(), value in arb_value()) {
        let before = base.clone();
        let _ = set(&base, &key, value);
        let _ = unset(&base, &key);
        prop_assert_eq!(base, before);
    }

    #[test]
    fn test_unset_after_set(base in arb_value(), key in arb_key(), value in arb_value()) {
        let updated = unset(&set(&base, &key, value), &key);
        prop_assert_eq!(get(&updated, &key), None);
    }
}
