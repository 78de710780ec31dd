//! Transactional partitioned row store contracts.
//!
//! Checkpoint rows are keyed by `(row_prefix, partition)`; one prefix
//! namespaces one logical owner, so independent pipelines can share a table.
//! A [`TransactionRunner`] scopes every read and write to one transaction:
//! the closure sees a consistent view, its writes become visible atomically
//! when it returns `Ok`, and are discarded when it returns `Err`.

use std::collections::HashMap;

/// Errors from the row store.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// I/O error from the backing store.
    #[error("table I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transaction could not commit; staged writes were discarded.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// The backing store's on-disk representation could not be decoded.
    #[error("table codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Primary key of one checkpoint row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    /// Owner prefix namespacing the row.
    pub prefix: String,
    /// Logical partition number.
    pub partition: i32,
}

impl RowKey {
    /// Builds a key from its parts.
    #[must_use]
    pub fn new(prefix: impl Into<String>, partition: i32) -> Self {
        Self {
            prefix: prefix.into(),
            partition,
        }
    }
}

/// One checkpoint row: key plus an opaque serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRow {
    /// Primary key.
    pub key: RowKey,
    /// Serialized checkpoint bytes; the store never inspects them.
    pub payload: Vec<u8>,
}

/// Table operations available inside a transaction.
pub trait CheckpointTable {
    /// Inserts or replaces the row for `row.key`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] if the write cannot be staged.
    fn upsert(&mut self, row: CheckpointRow) -> Result<(), TableError>;

    /// Reads the row for `key`, observing writes staged earlier in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] if the read fails.
    fn read(&self, key: &RowKey) -> Result<Option<CheckpointRow>, TableError>;
}

/// Transaction boundary over the row store.
pub trait TransactionRunner: Send + Sync {
    /// Runs `op` inside one transaction.
    ///
    /// Writes staged by `op` commit atomically iff it returns `Ok`. The
    /// runner does not retry; retry policy belongs to the caller.
    ///
    /// # Errors
    ///
    /// Returns the error from `op`, or [`TableError`] if the commit fails.
    fn run<T, F>(&self, op: F) -> Result<T, TableError>
    where
        F: FnMut(&mut dyn CheckpointTable) -> Result<T, TableError>;
}

impl<R: TransactionRunner> TransactionRunner for &R {
    fn run<T, F>(&self, op: F) -> Result<T, TableError>
    where
        F: FnMut(&mut dyn CheckpointTable) -> Result<T, TableError>,
    {
        (**self).run(op)
    }
}

impl<R: TransactionRunner> TransactionRunner for std::sync::Arc<R> {
    fn run<T, F>(&self, op: F) -> Result<T, TableError>
    where
        F: FnMut(&mut dyn CheckpointTable) -> Result<T, TableError>,
    {
        (**self).run(op)
    }
}

/// Copy-on-write staging area layered over a committed row snapshot.
///
/// Store implementations hand this to the transaction closure: reads fall
/// through to the snapshot unless shadowed, writes accumulate in the staged
/// overlay until the implementation decides to commit them.
pub struct StagedTable<'a> {
    committed: &'a HashMap<RowKey, Vec<u8>>,
    staged: HashMap<RowKey, Vec<u8>>,
}

impl<'a> StagedTable<'a> {
    /// Creates a staging area over `committed`.
    #[must_use]
    pub fn new(committed: &'a HashMap<RowKey, Vec<u8>>) -> Self {
        Self {
            committed,
            staged: HashMap::new(),
        }
    }

    /// Consumes the staging area, returning the writes to commit.
    #[must_use]
    pub fn into_staged(self) -> HashMap<RowKey, Vec<u8>> {
        self.staged
    }
}

impl CheckpointTable for StagedTable<'_> {
    fn upsert(&mut self, row: CheckpointRow) -> Result<(), TableError> {
        self.staged.insert(row.key, row.payload);
        Ok(())
    }

    fn read(&self, key: &RowKey) -> Result<Option<CheckpointRow>, TableError> {
        let payload = self
            .staged
            .get(key)
            .or_else(|| self.committed.get(key))
            .cloned();
        Ok(payload.map(|payload| CheckpointRow {
            key: key.clone(),
            payload,
        }))
    }
}
