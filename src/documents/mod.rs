//! Document stores.
//!
//! A document store persists one [`Record`] per root key. The client only
//! needs the small contract of [`DocumentStore`]; two implementations are
//! provided:
//!
//! - [`MemoryStore`]: a single in-process collection.
//! - [`FileStore`]: databases and collections on disk, one checksummed
//!   file per document, with connection lifecycle reporting.

mod file;
mod memory;

pub use file::{FileStore, StoreConfig};
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::Record;
use serde_json::Value;
use std::sync::Arc;

/// Persistence of `{key, value}` documents, keyed uniquely by root key.
///
/// Each call is a single request. Implementations serialize their own
/// writes, but nothing here spans more than one call.
pub trait DocumentStore: Send + Sync {
    /// Fetch the document stored under `key`.
    fn find_one(&self, key: &str) -> Result<Option<Record>>;

    /// Insert or replace the document stored under `key`.
    fn upsert(&self, key: &str, value: Value) -> Result<Record>;

    /// Delete the document stored under `key`. Returns whether it existed.
    fn delete_one(&self, key: &str) -> Result<bool>;

    /// All documents of the collection.
    fn find_all(&self) -> Result<Vec<Record>>;

    /// Delete every document of the collection. Returns how many were deleted.
    fn delete_all(&self) -> Result<u64>;

    /// Remove the collection itself.
    fn drop_collection(&self) -> Result<()>;

    /// Remove the whole database the collection belongs to.
    fn drop_database(&self) -> Result<()>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn find_one(&self, key: &str) -> Result<Option<Record>> {
        (**self).find_one(key)
    }

    fn upsert(&self, key: &str, value: Value) -> Result<Record> {
        (**self).upsert(key, value)
    }

    fn delete_one(&self, key: &str) -> Result<bool> {
        (**self).delete_one(key)
    }

    fn find_all(&self) -> Result<Vec<Record>> {
        (**self).find_all()
    }

    fn delete_all(&self) -> Result<u64> {
        (**self).delete_all()
    }

    fn drop_collection(&self) -> Result<()> {
        (**self).drop_collection()
    }

    fn drop_database(&self) -> Result<()> {
        (**self).drop_database()
    }
}
