//! # dotkv
//!
//! Key-value records addressed by dotted paths, layered over a document
//! store that keeps one document per root key.
//!
//! ## Core Concepts
//!
//! - **Keys**: `"user.profile.name"` addresses field `profile.name` inside
//!   the document stored under root key `user`
//! - **Records**: one `{key, value}` document per root key; values are
//!   arbitrary JSON
//! - **Document stores**: anything implementing [`DocumentStore`]; an
//!   in-memory and a file-backed store are included
//! - **Connections**: [`FileStore`] reports open/close/failure transitions to
//!   a [`ConnectionMonitor`] that can be polled or observed
//!
//! ## Example
//!
//! ```ignore
//! use dotkv::{FileStore, KvClient, StoreConfig};
//! use serde_json::json;
//!
//! let store = FileStore::open_or_create(StoreConfig {
//!     path: "./my-store".into(),
//!     ..Default::default()
//! })?;
//! let kv = KvClient::new(store);
//!
//! kv.store("user.name", json!("ada"))?;
//! kv.store("user.langs", json!(["en"]))?;
//! kv.append("user.langs", json!("fr"))?;
//! kv.increment("user.logins", 1)?;
//!
//! assert_eq!(kv.retrieve("user.name")?, Some(json!("ada")));
//! ```

pub mod client;
pub mod connection;
pub mod documents;
pub mod error;
pub mod operations;
pub mod path;
pub mod types;

// Re-exports
pub use client::KvClient;
pub use connection::{
    ConnectionEvent, ConnectionMonitor, ConnectionState, DropReason, ObserverConfig,
    ObserverHandle, ObserverId,
};
pub use documents::{DocumentStore, FileStore, MemoryStore, StoreConfig};
pub use error::{Result, StoreError};
pub use operations::{apply_operation, elements_equal, ValueOperation};
pub use path::{shape_for_store, KeyPath};
pub use types::*;
