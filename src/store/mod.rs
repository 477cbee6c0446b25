//! Keyed record store backed by sled
//!
//! One tree per named collection. Records are stored as JSON field maps under
//! monotonically generated keys; the internal key never appears inside the
//! record body, so reads hand back exactly the fields the pipeline wrote.

use crate::types::Record;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Errors from the record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Db(#[from] sled::Error),

    #[error("stored record is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Embedded document collection store
pub struct RecordStore {
    db: sled::Db,
}

impl RecordStore {
    /// Open or create the store under the given data directory
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(data_dir.as_ref().join("records.sled"))?;
        Ok(Self { db })
    }

    fn tree(&self, collection: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(collection)?)
    }

    /// Append one record to a named collection
    pub fn insert(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        let tree = self.tree(collection)?;
        let id = self.db.generate_id()?;
        tree.insert(id.to_be_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    /// Materialize every record in a collection, in insertion order.
    ///
    /// The returned vector is an owned snapshot: callers may iterate it any
    /// number of times without re-reading the store.
    pub fn iter(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let tree = self.tree(collection)?;
        let mut records = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Find the first record whose fields exactly match every given
    /// `(field, value)` pair. Used for idempotency lookups only.
    pub fn find_match(
        &self,
        collection: &str,
        criteria: &[(String, Value)],
    ) -> Result<Option<Record>, StoreError> {
        let tree = self.tree(collection)?;
        for entry in tree.iter() {
            let (_, value) = entry?;
            let record: Record = serde_json::from_slice(&value)?;
            if criteria
                .iter()
                .all(|(field, expected)| record.get(field) == Some(expected))
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Number of records in a collection
    pub fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.tree(collection)?.len())
    }

    /// Flush buffered writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
