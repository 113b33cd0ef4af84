//! File-backed document store.
//!
//! Layout under the root directory:
//!
//! ```text
//! MANIFEST                                  magic + version
//! LOCK                                      exclusive advisory lock
//! <database>/<collection>/<xx>/<sha256(key)>  one file per document
//! ```
//!
//! Document files are sharded by the first byte of the key hash and
//! replaced atomically (temp file, fsync, rename).

use super::DocumentStore;
use crate::connection::{
    ConnectionMonitor, ConnectionState, ObserverConfig, ObserverHandle, ObserverId,
};
use crate::error::{Result, StoreError};
use crate::types::{KeyHash, Record};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"DKV\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Magic bytes for document files.
const DOC_MAGIC: &[u8; 4] = b"DOC\0";

/// Current document format version.
const DOC_VERSION: u8 = 1;

/// Extension of documents being written.
const TMP_EXTENSION: &str = "tmp";

/// Names that would collide with files in the root directory.
const RESERVED_NAMES: [&str; 2] = ["MANIFEST", "LOCK"];

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Root directory of the store.
    pub path: PathBuf,

    /// Database to open.
    pub database: String,

    /// Collection to open.
    pub collection: String,

    /// Document cache size (number of documents).
    pub cache_size: usize,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store"),
            database: "default".to_string(),
            collection: "records".to_string(),
            cache_size: 1000,
            create_if_missing: true,
        }
    }
}

/// State shared by every handle opened from the same root.
struct Shared {
    root: PathBuf,

    /// Held while connected; `None` once closed.
    lock_file: Mutex<Option<File>>,

    /// Recently read or written documents, keyed by file path.
    cache: Mutex<LruCache<PathBuf, Record>>,

    /// Writers take it exclusively. Readers share it so a disk read and its
    /// cache insert cannot interleave with a write to the same document.
    io_lock: RwLock<()>,

    monitor: Arc<ConnectionMonitor>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if self.lock_file.get_mut().take().is_some() {
            self.monitor.mark_disconnected();
        }
    }
}

/// Document store persisting each record as a file.
///
/// Handles for other collections or databases of the same root are
/// obtained with [`with_collection`](Self::with_collection) and
/// [`with_database`](Self::with_database); they share the lock, cache and
/// connection state of the handle they came from.
pub struct FileStore {
    shared: Arc<Shared>,
    database: String,
    collection: String,
}

impl FileStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        Self::connect(config, Arc::new(ConnectionMonitor::new()))
    }

    /// Open a store, reporting the outcome to `monitor`.
    ///
    /// On failure the monitor moves to `Failed` and observers receive a
    /// `ConnectionError` event before the error is returned.
    pub fn connect(config: StoreConfig, monitor: Arc<ConnectionMonitor>) -> Result<Self> {
        match Self::open_with(&config, Arc::clone(&monitor)) {
            Ok(store) => {
                monitor.mark_connected(&store.database, &store.collection);
                Ok(store)
            }
            Err(e) => {
                monitor.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    fn open_with(config: &StoreConfig, monitor: Arc<ConnectionMonitor>) -> Result<Self> {
        validate_name("database", &config.database)?;
        validate_name("collection", &config.collection)?;

        if config.path.join("MANIFEST").exists() {
            verify_manifest(&config.path)?;
        } else if config.create_if_missing {
            fs::create_dir_all(&config.path)?;
            write_manifest(&config.path)?;
        } else {
            return Err(StoreError::NotInitialized);
        }

        let lock_file = acquire_lock(&config.path)?;
        let cache_size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);

        info!(
            target: "dotkv::file_store",
            path = %config.path.display(),
            database = %config.database,
            collection = %config.collection,
            "Opened store"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                root: config.path.clone(),
                lock_file: Mutex::new(Some(lock_file)),
                cache: Mutex::new(LruCache::new(cache_size)),
                io_lock: RwLock::new(()),
                monitor,
            }),
            database: config.database.clone(),
            collection: config.collection.clone(),
        })
    }

    // --- Lifecycle ---

    /// Release the lock and stop serving requests.
    ///
    /// Applies to every handle sharing this connection. Closing twice is a
    /// no-op.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.shared.lock_file.lock();
        let Some(file) = guard.take() else {
            return Ok(());
        };
        self.shared.cache.lock().clear();
        let unlocked = FileExt::unlock(&file);
        drop(file);
        drop(guard);

        // The file is closed, so the lock is released even if unlock failed.
        if let Err(e) = &unlocked {
            self.shared
                .monitor
                .report_disconnection_error(&e.to_string());
        }
        self.shared.monitor.mark_disconnected();
        unlocked.map_err(StoreError::from)
    }

    /// Re-acquire the lock after [`close`](Self::close).
    pub fn reopen(&self) -> Result<()> {
        let mut guard = self.shared.lock_file.lock();
        if guard.is_some() {
            return Ok(());
        }

        let root = &self.shared.root;
        match verify_manifest(root).and_then(|_| acquire_lock(root)) {
            Ok(file) => {
                *guard = Some(file);
                drop(guard);
                self.shared
                    .monitor
                    .mark_connected(&self.database, &self.collection);
                Ok(())
            }
            Err(e) => {
                drop(guard);
                self.shared.monitor.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Whether the store currently serves requests.
    pub fn is_open(&self) -> bool {
        self.shared.lock_file.lock().is_some()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.monitor.state()
    }

    /// Time since the store was (re)opened, zero when closed.
    pub fn uptime(&self) -> Duration {
        self.shared.monitor.uptime()
    }

    /// Receive connection events.
    pub fn subscribe(&self, config: ObserverConfig) -> ObserverHandle {
        self.shared.monitor.subscribe(config)
    }

    /// Stop receiving connection events.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.shared.monitor.unsubscribe(id)
    }

    /// The monitor this store reports to.
    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.shared.monitor
    }

    // --- Database / Collection ---

    /// Root directory of the store.
    pub fn path(&self) -> &Path {
        &self.shared.root
    }

    /// Database this handle reads and writes.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Collection this handle reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// A handle for another collection of the same database.
    pub fn with_collection(&self, name: &str) -> Result<FileStore> {
        validate_name("collection", name)?;
        Ok(FileStore {
            shared: Arc::clone(&self.shared),
            database: self.database.clone(),
            collection: name.to_string(),
        })
    }

    /// A handle for the same collection name in another database.
    pub fn with_database(&self, name: &str) -> Result<FileStore> {
        validate_name("database", name)?;
        Ok(FileStore {
            shared: Arc::clone(&self.shared),
            database: name.to_string(),
            collection: self.collection.clone(),
        })
    }

    // --- Internals ---

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is closed".into()))
        }
    }

    /// Report failed requests to observers; the error is still returned.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.shared.monitor.report_error(&e.to_string());
        }
        result
    }

    fn database_dir(&self) -> PathBuf {
        self.shared.root.join(&self.database)
    }

    fn collection_dir(&self) -> PathBuf {
        self.database_dir().join(&self.collection)
    }

    fn document_path(&self, key: &str) -> PathBuf {
        let hash = KeyHash::of_key(key);
        self.collection_dir()
            .join(hash.shard_prefix())
            .join(hash.to_hex())
    }

    /// Paths of all documents in the collection.
    fn document_paths(&self) -> Result<Vec<PathBuf>> {
        let dir = self.collection_dir();
        let mut paths = Vec::new();
        if !dir.exists() {
            return Ok(paths);
        }

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                for doc_entry in fs::read_dir(entry.path())? {
                    let doc_entry = doc_entry?;
                    let filename = doc_entry.file_name();
                    if KeyHash::from_hex(&filename.to_string_lossy()).is_ok() {
                        paths.push(doc_entry.path());
                    }
                }
            }
        }

        Ok(paths)
    }

    fn load(&self, path: &Path) -> Result<Record> {
        if let Some(cached) = self.shared.cache.lock().get(path).cloned() {
            return Ok(cached);
        }
        let record = read_document(path)?;
        self.shared
            .cache
            .lock()
            .put(path.to_path_buf(), record.clone());
        Ok(record)
    }
}

impl DocumentStore for FileStore {
    fn find_one(&self, key: &str) -> Result<Option<Record>> {
        self.ensure_open()?;
        let _lock = self.shared.io_lock.read();

        let path = self.document_path(key);
        if !self.shared.cache.lock().contains(&path) && !path.exists() {
            return Ok(None);
        }

        let record = self.observe(self.load(&path))?;
        if record.key != key {
            return self.observe(Err(StoreError::Corruption(format!(
                "document for {:?} holds key {:?}",
                key, record.key
            ))));
        }
        Ok(Some(record))
    }

    fn upsert(&self, key: &str, value: Value) -> Result<Record> {
        self.ensure_open()?;
        let _lock = self.shared.io_lock.write();

        let record = Record::new(key, value);
        let path = self.document_path(key);
        self.observe(write_document(&path, &record))?;
        self.shared.cache.lock().put(path, record.clone());

        debug!(target: "dotkv::file_store", key, collection = %self.collection, "Upserted document");
        Ok(record)
    }

    fn delete_one(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let _lock = self.shared.io_lock.write();

        let path = self.document_path(key);
        self.shared.cache.lock().pop(&path);

        if path.exists() {
            self.observe(fs::remove_file(&path).map_err(StoreError::from))?;
            debug!(target: "dotkv::file_store", key, collection = %self.collection, "Deleted document");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn find_all(&self) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let _lock = self.shared.io_lock.read();

        let paths = self.observe(self.document_paths())?;
        let records: Result<Vec<Record>> = paths.iter().map(|path| self.load(path)).collect();

        let mut records = self.observe(records)?;
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn delete_all(&self) -> Result<u64> {
        self.ensure_open()?;
        let _lock = self.shared.io_lock.write();

        let paths = self.observe(self.document_paths())?;
        let mut deleted = 0u64;
        for path in &paths {
            self.observe(fs::remove_file(path).map_err(StoreError::from))?;
            deleted += 1;
        }
        self.shared.cache.lock().clear();

        debug!(target: "dotkv::file_store", deleted, collection = %self.collection, "Deleted all documents");
        Ok(deleted)
    }

    fn drop_collection(&self) -> Result<()> {
        self.ensure_open()?;
        let _lock = self.shared.io_lock.write();

        let dir = self.collection_dir();
        if dir.exists() {
            self.observe(fs::remove_dir_all(&dir).map_err(StoreError::from))?;
        }
        self.shared.cache.lock().clear();

        info!(target: "dotkv::file_store", database = %self.database, collection = %self.collection, "Dropped collection");
        Ok(())
    }

    fn drop_database(&self) -> Result<()> {
        self.ensure_open()?;
        let _lock = self.shared.io_lock.write();

        let dir = self.database_dir();
        if dir.exists() {
            self.observe(fs::remove_dir_all(&dir).map_err(StoreError::from))?;
        }
        self.shared.cache.lock().clear();

        info!(target: "dotkv::file_store", database = %self.database, "Dropped database");
        Ok(())
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if name.is_empty() || !valid_chars || RESERVED_NAMES.contains(&name) {
        return Err(StoreError::InvalidName(format!(
            "{} name {:?} must be non-empty ASCII alphanumerics, '_' or '-'",
            kind, name
        )));
    }
    Ok(())
}

fn write_manifest(path: &Path) -> Result<()> {
    let manifest_path = path.join("MANIFEST");
    let mut file = File::create(manifest_path)?;

    file.write_all(STORE_MAGIC)?;
    file.write_all(&[STORE_VERSION])?;
    file.sync_all()?;

    Ok(())
}

fn verify_manifest(path: &Path) -> Result<()> {
    let manifest_path = path.join("MANIFEST");
    let mut file = File::open(manifest_path)?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != STORE_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid store magic".into()));
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != STORE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported store version: {}",
            version[0]
        )));
    }

    Ok(())
}

fn acquire_lock(path: &Path) -> Result<File> {
    let lock_path = path.join("LOCK");
    let lock_file = File::create(lock_path)?;

    lock_file
        .try_lock_exclusive()
        .map_err(|_| StoreError::Locked)?;

    Ok(lock_file)
}

fn write_document(path: &Path, record: &Record) -> Result<()> {
    let key_bytes = record.key.as_bytes();
    let key_len = u16::try_from(key_bytes.len()).map_err(|_| {
        StoreError::InvalidKey(format!("key is longer than {} bytes", u16::MAX))
    })?;
    let body = rmp_serde::to_vec_named(record)?;

    if let Some(shard_dir) = path.parent() {
        fs::create_dir_all(shard_dir)?;
    }

    let tmp_path = path.with_extension(TMP_EXTENSION);
    {
        let mut file = File::create(&tmp_path)?;

        // Header
        file.write_all(DOC_MAGIC)?;
        file.write_all(&[DOC_VERSION])?;

        // Key
        file.write_all(&key_len.to_le_bytes())?;
        file.write_all(key_bytes)?;

        // Body
        file.write_all(&(body.len() as u64).to_le_bytes())?;
        file.write_all(&body)?;

        // Checksum
        file.write_all(&crc32fast::hash(&body).to_le_bytes())?;

        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}

fn read_document(path: &Path) -> Result<Record> {
    let mut file = File::open(path)?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != DOC_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid document magic".into()));
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != DOC_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported document version: {}",
            version[0]
        )));
    }

    let file_len = file.metadata()?.len();

    let mut key_len_bytes = [0u8; 2];
    file.read_exact(&mut key_len_bytes)?;
    let key_len = u16::from_le_bytes(key_len_bytes);
    let mut key_bytes = vec![0u8; usize::from(key_len)];
    file.read_exact(&mut key_bytes)?;
    let key = String::from_utf8(key_bytes)
        .map_err(|_| StoreError::Corruption("document key is not UTF-8".into()))?;

    let mut body_len_bytes = [0u8; 8];
    file.read_exact(&mut body_len_bytes)?;
    let body_len = u64::from_le_bytes(body_len_bytes);

    // Header, key, body length and trailing checksum surround the body
    let framing = (DOC_MAGIC.len() + 1 + 2 + 8 + 4) as u64 + u64::from(key_len);
    let available = file_len.saturating_sub(framing);
    if body_len > available {
        return Err(StoreError::Corruption(format!(
            "document body length {} exceeds the {} bytes available",
            body_len, available
        )));
    }
    let body_len = usize::try_from(body_len).map_err(|_| {
        StoreError::Corruption(format!("document body length {} is too large", body_len))
    })?;
    let mut body = vec![0u8; body_len];
    file.read_exact(&mut body)?;

    let mut checksum_bytes = [0u8; 4];
    file.read_exact(&mut checksum_bytes)?;
    let stored_checksum = u32::from_le_bytes(checksum_bytes);
    let computed_checksum = crc32fast::hash(&body);
    if stored_checksum != computed_checksum {
        return Err(StoreError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }

    let record: Record = rmp_serde::from_slice(&body)?;
    if record.key != key {
        return Err(StoreError::Corruption(format!(
            "header key {:?} does not match body key {:?}",
            key, record.key
        )));
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("store"),
            cache_size: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_document_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ab").join("doc");
        let record = Record::new("user", json!({"name": "ada", "tags": [1, 2.5, null]}));

        write_document(&path, &record).unwrap();
        assert_eq!(read_document(&path).unwrap(), record);
        assert!(!path.with_extension(TMP_EXTENSION).exists());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc");
        write_document(&path, &Record::new("k", json!("value"))).unwrap();

        // Flip a byte inside the body
        let mut bytes = fs::read(&path).unwrap();
        let body_byte = bytes.len() - 6;
        bytes[body_byte] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_document(&path),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_body_length_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc");
        write_document(&path, &Record::new("k", json!("value"))).unwrap();

        // Body length follows magic, version, key length and the 1-byte key
        let mut bytes = fs::read(&path).unwrap();
        bytes[8..16].copy_from_slice(&[0xFF; 8]);
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            read_document(&path),
            Err(StoreError::Corruption(_))
        ));

        // One byte more than the file holds
        let real_len = (bytes.len() - 8 - 8 - 4) as u64;
        bytes[8..16].copy_from_slice(&(real_len + 1).to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            read_document(&path),
            Err(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc");
        fs::write(&path, b"XXXX\x01").unwrap();

        assert!(matches!(
            read_document(&path),
            Err(StoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("collection", "records_2024-a").is_ok());
        for name in ["", "a/b", "..", "a.b", "LOCK", "MANIFEST", "spaced name"] {
            assert!(
                matches!(validate_name("collection", name), Err(StoreError::InvalidName(_))),
                "expected {:?} to be rejected",
                name
            );
        }
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let store = FileStore::open_or_create(config.clone()).unwrap();

        assert!(config.path.join("MANIFEST").exists());
        assert!(config.path.join("LOCK").exists());
        assert!(store.is_open());
        assert_eq!(store.database(), "default");
        assert_eq!(store.collection(), "records");
    }

    #[test]
    fn test_not_initialized_without_create() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            create_if_missing: false,
            ..test_config(&dir)
        };

        assert!(matches!(
            FileStore::open_or_create(config),
            Err(StoreError::NotInitialized)
        ));
    }

    #[test]
    fn test_delete_invalidates_cache() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open_or_create(test_config(&dir)).unwrap();
        store.upsert("k", json!(1)).unwrap();

        assert!(store.delete_one("k").unwrap());
        assert!(store.find_one("k").unwrap().is_none());
    }

    #[test]
    fn test_document_paths_skip_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open_or_create(test_config(&dir)).unwrap();
        store.upsert("k", json!(1)).unwrap();

        let stray = store.document_path("other").with_extension(TMP_EXTENSION);
        fs::create_dir_all(stray.parent().unwrap()).unwrap();
        fs::write(&stray, b"partial").unwrap();

        assert_eq!(store.document_paths().unwrap().len(), 1);
    }
}
