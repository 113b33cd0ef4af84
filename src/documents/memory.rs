//! In-memory document store.

use super::DocumentStore;
use crate::error::Result;
use crate::types::Record;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single collection held in memory, ordered by key.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(&self, key: &str) -> Result<Option<Record>> {
        Ok(self
            .documents
            .read()
            .get(key)
            .map(|value| Record::new(key, value.clone())))
    }

    fn upsert(&self, key: &str, value: Value) -> Result<Record> {
        self.documents.write().insert(key.to_string(), value.clone());
        Ok(Record::new(key, value))
    }

    fn delete_one(&self, key: &str) -> Result<bool> {
        Ok(self.documents.write().remove(key).is_some())
    }

    fn find_all(&self) -> Result<Vec<Record>> {
        Ok(self
            .documents
            .read()
            .iter()
            .map(|(key, value)| Record::new(key.as_str(), value.clone()))
            .collect())
    }

    fn delete_all(&self) -> Result<u64> {
        let mut documents = self.documents.write();
        let count = documents.len() as u64;
        documents.clear();
        Ok(count)
    }

    fn drop_collection(&self) -> Result<()> {
        self.documents.write().clear();
        Ok(())
    }

    fn drop_database(&self) -> Result<()> {
        self.documents.write().clear();
        Ok(())
    }
}
