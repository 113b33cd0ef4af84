//! Dot-path resolution over nested JSON values.
//!
//! All functions are pure: mutating helpers return a new value and never
//! alias the caller's structures.

use crate::error::{Result, StoreError};
use serde_json::{Map, Value};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// A key split into its root and the remaining sub-path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPath<'a> {
    /// Segment before the first dot; the lookup key in the document store.
    pub root: &'a str,
    /// Remaining dot-joined segments, empty when the key has no dot.
    pub sub_path: &'a str,
}

impl<'a> KeyPath<'a> {
    /// Whether the key addresses something inside the root document.
    pub fn has_sub_path(&self) -> bool {
        !self.sub_path.is_empty()
    }
}

/// Split a key into root and sub-path.
///
/// Fails with [`StoreError::InvalidKey`] if the key is empty or contains an
/// empty segment (`".a"`, `"a."`, `"a..b"`).
pub fn split(key: &str) -> Result<KeyPath<'_>> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key must not be empty".into()));
    }
    if key.split(PATH_SEPARATOR).any(str::is_empty) {
        return Err(StoreError::InvalidKey(format!(
            "key {:?} contains an empty segment",
            key
        )));
    }

    let (root, sub_path) = key.split_once(PATH_SEPARATOR).unwrap_or((key, ""));
    Ok(KeyPath { root, sub_path })
}

/// Look up the value at `sub_path`.
///
/// Returns `None` as soon as a segment is missing or the current value is
/// not a mapping. An empty sub-path returns `value` itself.
pub fn get<'v>(value: &'v Value, sub_path: &str) -> Option<&'v Value> {
    if sub_path.is_empty() {
        return Some(value);
    }
    sub_path
        .split(PATH_SEPARATOR)
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Whether a value exists at `sub_path`.
pub fn has(value: &Value, sub_path: &str) -> bool {
    get(value, sub_path).is_some()
}

/// Return a copy of `value` with the field at `sub_path` set to `new_value`.
///
/// Missing intermediate mappings are created. Any non-mapping found along
/// the path, including `value` itself, is replaced by an empty mapping.
/// An empty sub-path returns `new_value`.
pub fn set(value: &Value, sub_path: &str, new_value: Value) -> Value {
    if sub_path.is_empty() {
        return new_value;
    }
    let mut copy = clone_deep(value);
    set_in_place(&mut copy, sub_path, new_value);
    copy
}

fn set_in_place(target: &mut Value, sub_path: &str, new_value: Value) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };

    match sub_path.split_once(PATH_SEPARATOR) {
        None => {
            map.insert(sub_path.to_string(), new_value);
        }
        Some((head, rest)) => {
            let child = map.entry(head).or_insert(Value::Null);
            set_in_place(child, rest, new_value);
        }
    }
}

/// Return a copy of `value` with the field at `sub_path` removed.
///
/// The copy is unchanged if the path does not exist or is empty.
pub fn unset(value: &Value, sub_path: &str) -> Value {
    let mut copy = clone_deep(value);
    if !sub_path.is_empty() {
        unset_in_place(&mut copy, sub_path);
    }
    copy
}

fn unset_in_place(target: &mut Value, sub_path: &str) -> bool {
    let Value::Object(map) = target else {
        return false;
    };
    match sub_path.split_once(PATH_SEPARATOR) {
        None => map.remove(sub_path).is_some(),
        Some((head, rest)) => map
            .get_mut(head)
            .map_or(false, |child| unset_in_place(child, rest)),
    }
}

/// Structural deep copy.
///
/// Values are trees, so there is no cycle detection.
pub fn clone_deep(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::Number(n) => Value::Number(n.clone()),
        Value::String(s) => Value::String(s.clone()),
        Value::Array(items) => Value::Array(items.iter().map(clone_deep).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), clone_deep(v)))
                .collect(),
        ),
    }
}
