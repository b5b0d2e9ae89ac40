//! Typed sled tables
//!
//! Wraps a `sled::Tree` with a record codec so callers read and write domain
//! values instead of raw bytes. Every failure is reported with the table name
//! and the operation that failed.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Tree;
use std::marker::PhantomData;

/// Value encoding used by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Compact binary encoding for hot, fixed-shape records.
    Bincode,
    /// JSON for records that embed opaque JSON blobs.
    Json,
}

/// A sled tree holding values of one record type.
pub struct Table<T> {
    name: &'static str,
    tree: Tree,
    codec: Codec,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tree: self.tree.clone(),
            codec: self.codec,
            _record: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Table<T> {
    pub fn open(db: &sled::Db, name: &'static str, codec: Codec) -> Result<Self, StorageError> {
        let tree = db.open_tree(name).map_err(backend(name, "open"))?;
        Ok(Self {
            name,
            tree,
            codec,
            _record: PhantomData,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.tree.get(key).map_err(backend(self.name, "get"))? else {
            return Ok(None);
        };
        self.decode(key, &raw).map(Some)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.tree
            .contains_key(key)
            .map_err(backend(self.name, "contains"))
    }

    pub fn insert(&self, key: &[u8], value: &T) -> Result<(), StorageError> {
        let encoded = self.encode(value)?;
        self.tree
            .insert(key, encoded)
            .map_err(backend(self.name, "insert"))?;
        Ok(())
    }

    pub fn remove(&self, key: &[u8]) -> Result<bool, StorageError> {
        let removed = self.tree.remove(key).map_err(backend(self.name, "remove"))?;
        Ok(removed.is_some())
    }

    /// Decode every record in key order.
    pub fn values(&self) -> Result<Vec<T>, StorageError> {
        let mut out = Vec::with_capacity(self.tree.len());
        for item in self.tree.iter() {
            let (key, value) = item.map_err(backend(self.name, "scan"))?;
            out.push(self.decode(&key, &value)?);
        }
        Ok(out)
    }

    /// Decode every record as a lazy iterator over a point-in-time sled view.
    pub fn iter(&self) -> impl Iterator<Item = Result<T, StorageError>> + '_ {
        self.tree.iter().map(move |item| {
            let (key, value) = item.map_err(backend(self.name, "scan"))?;
            self.decode(&key, &value)
        })
    }

    pub fn keys(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut out = Vec::with_capacity(self.tree.len());
        for key in self.tree.iter().keys() {
            out.push(key.map_err(backend(self.name, "scan"))?.to_vec());
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Apply a set of upserts and removals atomically.
    ///
    /// Either every write in the batch lands or none does.
    pub fn apply(&self, writes: Vec<(Vec<u8>, Option<T>)>) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for (key, value) in writes {
            match value {
                Some(record) => batch.insert(key, self.encode(&record)?),
                None => batch.remove(key),
            }
        }
        self.tree
            .apply_batch(batch)
            .map_err(backend(self.name, "apply_batch"))
    }

    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn encode(&self, value: &T) -> Result<Vec<u8>, StorageError> {
        match self.codec {
            Codec::Bincode => bincode::serialize(value).map_err(|e| StorageError::Encode {
                table: self.name,
                message: e.to_string(),
            }),
            Codec::Json => serde_json::to_vec(value).map_err(|e| StorageError::Encode {
                table: self.name,
                message: e.to_string(),
            }),
        }
    }

    fn decode(&self, key: &[u8], raw: &[u8]) -> Result<T, StorageError> {
        let result = match self.codec {
            Codec::Bincode => bincode::deserialize(raw).map_err(|e| e.to_string()),
            Codec::Json => serde_json::from_slice(raw).map_err(|e| e.to_string()),
        };
        result.map_err(|message| StorageError::Corrupt {
            table: self.name,
            key: String::from_utf8_lossy(key).into_owned(),
            message,
        })
    }
}

/// Map a sled error to a `StorageError` naming the table and operation.
pub fn backend(
    table: &'static str,
    operation: &'static str,
) -> impl FnOnce(sled::Error) -> StorageError {
    move |source| StorageError::Backend {
        table,
        operation,
        source,
    }
}
