//! In-memory implementation of the transactional row store.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::table::{CheckpointTable, RowKey, StagedTable, TableError, TransactionRunner};

/// In-memory transactional row store.
///
/// Used by tests and ephemeral deployments. The store counts transactions and
/// can be told to fail commits, so callers can assert on transaction traffic
/// and exercise their failure paths without a faulty disk.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<RowKey, Vec<u8>>,
    transactions: u64,
    fail_commits: bool,
}

impl MemoryTableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions begun against this store.
    #[must_use]
    pub fn transactions(&self) -> u64 {
        self.inner.lock().transactions
    }

    /// Number of committed rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.inner.lock().rows.len()
    }

    /// Makes every subsequent commit fail with [`TableError::Aborted`] until
    /// reset. Fault injection for callers' error paths.
    pub fn set_fail_commits(&self, fail: bool) {
        self.inner.lock().fail_commits = fail;
    }
}

impl TransactionRunner for MemoryTableStore {
    fn run<T, F>(&self, mut op: F) -> Result<T, TableError>
    where
        F: FnMut(&mut dyn CheckpointTable) -> Result<T, TableError>,
    {
        let mut inner = self.inner.lock();
        inner.transactions += 1;

        let mut staged = StagedTable::new(&inner.rows);
        let out = op(&mut staged)?;
        let writes = staged.into_staged();

        if inner.fail_commits {
            return Err(TableError::Aborted("commit rejected by fault injection".to_string()));
        }

        inner.rows.extend(writes);
        Ok(out)
    }
}
