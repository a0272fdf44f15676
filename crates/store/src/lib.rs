//! Keyed block store.
//!
//! This crate provides the ordered key-value capability consumed by the DA
//! layer client and the chain state store: point get/put plus prefix
//! enumeration over path-like string keys. The default implementation is
//! backed by a sled tree, so independent key families can share one database.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Ordered key-value store with prefix enumeration.
///
/// Implementations must be safe for concurrent access to independent keys.
pub trait KeyedStore: Send + Sync {
    /// Insert or overwrite a value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Get a value, failing with [`StoreError::NotFound`] when the key is absent.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Snapshot of all entries whose key starts with `prefix`, in key order.
    fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Get a value, mapping a missing key to `None`.
    fn get_opt(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// [`KeyedStore`] over a single sled tree.
#[derive(Clone)]
pub struct SledStore {
    tree: sled::Tree,
}

impl SledStore {
    /// Open or create a database at the given path and use the named tree.
    pub fn open(path: impl AsRef<Path>, tree: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(&db, tree)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(tree: &str) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db, tree)
    }

    /// Use the named tree of an already opened database.
    pub fn from_db(db: &sled::Db, tree: &str) -> Result<Self, StoreError> {
        debug!("Opening store tree {}", tree);
        Ok(Self {
            tree: db.open_tree(tree)?,
        })
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.tree.flush()?;
        Ok(())
    }
}

impl KeyedStore for SledStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("empty key".to_string()));
        }
        self.tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.tree
            .get(key.as_bytes())?
            .map(|v| v.to_vec())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.tree
            .scan_prefix(prefix.as_bytes())
            .map(|entry| {
                let (k, v) = entry?;
                let key = String::from_utf8(k.to_vec())
                    .map_err(|e| StoreError::InvalidKey(e.to_string()))?;
                Ok((key, v.to_vec()))
            })
            .collect()
    }
}
