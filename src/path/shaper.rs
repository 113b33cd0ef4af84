//! Shaping a dotted key and a value into a storable record.

use super::resolver::{self, PATH_SEPARATOR};
use crate::error::{Result, StoreError};
use crate::types::Record;
use serde_json::{Map, Value};

/// Build the minimal nested structure for `key` and split it into the root
/// key and the value stored under it.
///
/// `shape_for_store("a.b.c", 1)` yields `Record { key: "a", value: {"b": {"c": 1}} }`.
/// The result describes only this one path: writing it over an existing
/// record would drop its siblings, so callers merge into existing documents
/// instead.
pub fn shape_for_store(key: &str, value: Value) -> Result<Record> {
    let path = resolver::split(key)?;

    let shaped = resolver::set(&Value::Object(Map::new()), key, value);
    let Value::Object(mut top) = shaped else {
        return Err(StoreError::InvalidKey(format!("key {:?} cannot be shaped", key)));
    };

    let nested = top.remove(path.root).ok_or_else(|| {
        StoreError::InvalidKey(format!(
            "key {:?} has no root before {:?}",
            key, PATH_SEPARATOR
        ))
    })?;

    Ok(Record::new(path.root, nested))
}
