//! Dot-path key-value client over a document store.

use crate::documents::DocumentStore;
use crate::error::{Result, StoreError};
use crate::operations::{apply_operation, ValueOperation};
use crate::path::{self, shape_for_store, KeyPath};
use crate::types::Record;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Key-value access to a document store.
///
/// Keys are dotted paths: the first segment selects the stored document,
/// the rest navigates nested mappings inside it. Every method validates its
/// arguments before touching the store and propagates store errors
/// unchanged, without retrying.
///
/// # Concurrency
///
/// `store` with a sub-path, `increment`, `decrement`, `append` and
/// `remove_element` read the current document and then write it back.
/// Nothing serializes those two calls: concurrent read-modify-writes on the
/// same root key race and the last write wins. Callers that need atomic
/// updates must serialize them externally.
#[derive(Clone)]
pub struct KvClient {
    store: Arc<dyn DocumentStore>,
}

impl KvClient {
    /// Create a client owning `store`.
    pub fn new<S: DocumentStore + 'static>(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Create a client over a shared store.
    pub fn from_shared(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The underlying document store.
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // --- Reads ---

    /// Get the value at `key`.
    ///
    /// Returns `None` when the root document does not exist, when the
    /// sub-path is missing, or when the sub-path points into a value that is
    /// not a mapping.
    pub fn retrieve(&self, key: &str) -> Result<Option<Value>> {
        let path = path::split(key)?;
        self.retrieve_path(&path)
    }

    /// Whether `retrieve(key)` returns a value. A stored `null` exists.
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.retrieve(key)?.is_some())
    }

    fn retrieve_path(&self, path: &KeyPath<'_>) -> Result<Option<Value>> {
        let Some(record) = self.store.find_one(path.root)? else {
            return Ok(None);
        };

        if !path.has_sub_path() {
            return Ok(Some(record.value));
        }
        if !record.value.is_object() {
            return Ok(None);
        }
        Ok(path::get(&record.value, path.sub_path).cloned())
    }

    /// All stored records.
    pub fn list_all(&self) -> Result<Vec<Record>> {
        self.store.find_all()
    }

    // --- Writes ---

    /// Store `value` at `key`, returning the updated root record.
    ///
    /// A key without sub-path replaces the whole document in one call. A key
    /// with a sub-path is merged into the existing document: siblings of the
    /// addressed field are kept, and missing intermediate mappings are
    /// created.
    pub fn store(&self, key: &str, value: impl Into<Option<Value>>) -> Result<Record> {
        let path = path::split(key)?;
        let value = value
            .into()
            .ok_or_else(|| StoreError::InvalidValue("value must be provided".into()))?;
        self.store_path(&path, key, value)
    }

    fn store_path(&self, path: &KeyPath<'_>, key: &str, value: Value) -> Result<Record> {
        let record = if path.has_sub_path() {
            match self.store.find_one(path.root)? {
                Some(existing) => Record::new(
                    path.root,
                    path::set(&existing.value, path.sub_path, value),
                ),
                None => shape_for_store(key, value)?,
            }
        } else {
            shape_for_store(key, value)?
        };

        debug!(target: "dotkv::client", key, root = record.key.as_str(), "Storing record");
        self.store.upsert(&record.key, record.value)
    }

    /// Remove the value at `key`.
    ///
    /// Returns `false` if the root document does not exist. A key without
    /// sub-path, or one pointing into a non-mapping document, deletes the
    /// whole document. Otherwise the field is removed and the document
    /// rewritten.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = path::split(key)?;

        let Some(existing) = self.store.find_one(path.root)? else {
            return Ok(false);
        };

        if !path.has_sub_path() || !existing.value.is_object() {
            debug!(target: "dotkv::client", key, "Deleting record");
            self.store.delete_one(path.root)?;
            return Ok(true);
        }

        debug!(target: "dotkv::client", key, "Removing field");
        let updated = path::unset(&existing.value, path.sub_path);
        self.store.upsert(path.root, updated)?;
        Ok(true)
    }

    /// Delete every record. Returns how many were deleted.
    pub fn clear_all(&self) -> Result<u64> {
        let deleted = self.store.delete_all()?;
        debug!(target: "dotkv::client", deleted, "Cleared all records");
        Ok(deleted)
    }

    /// Drop the underlying collection.
    pub fn drop_collection(&self) -> Result<()> {
        self.store.drop_collection()
    }

    /// Drop the database holding the underlying collection.
    pub fn drop_database(&self) -> Result<()> {
        self.store.drop_database()
    }

    // --- Read-modify-write ---

    /// Add `amount` to the number at `key` (absent counts as 0).
    pub fn increment(&self, key: &str, amount: impl Into<Value>) -> Result<Record> {
        let path = path::split(key)?;
        let operation = ValueOperation::add(amount.into())?;
        self.read_modify_write(&path, key, operation)
    }

    /// Subtract `amount` from the number at `key` (absent counts as 0).
    pub fn decrement(&self, key: &str, amount: impl Into<Value>) -> Result<Record> {
        let path = path::split(key)?;
        let operation = ValueOperation::subtract(amount.into())?;
        self.read_modify_write(&path, key, operation)
    }

    /// Push `element` onto the array at `key` (absent counts as `[]`).
    pub fn append(&self, key: &str, element: impl Into<Option<Value>>) -> Result<Record> {
        let path = path::split(key)?;
        let operation = ValueOperation::append(element.into())?;
        self.read_modify_write(&path, key, operation)
    }

    /// Remove every element equal to `element` from the array at `key`.
    ///
    /// Only scalars match; see [`elements_equal`](crate::operations::elements_equal).
    pub fn remove_element(&self, key: &str, element: impl Into<Option<Value>>) -> Result<Record> {
        let path = path::split(key)?;
        let operation = ValueOperation::remove_element(element.into())?;
        self.read_modify_write(&path, key, operation)
    }

    fn read_modify_write(
        &self,
        path: &KeyPath<'_>,
        key: &str,
        operation: ValueOperation,
    ) -> Result<Record> {
        let current = self.retrieve_path(path)?;
        let updated = apply_operation(current, operation)?;
        self.store_path(path, key, updated)
    }
}
