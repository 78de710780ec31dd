//! Single-file JSON implementation of the transactional row store.
//!
//! Rows live in one JSON file. A transaction loads the file, runs the
//! closure against a staging overlay, then commits by writing a temporary
//! file, fsyncing it, and renaming over the original, so readers never see a
//! partial table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::table::{CheckpointTable, RowKey, StagedTable, TableError, TransactionRunner};

/// Fsync a file to ensure its contents are durable on disk.
fn sync_file(path: &Path) -> Result<(), std::io::Error> {
    // Must open with write access — Windows requires it for FlushFileBuffers.
    let f = std::fs::OpenOptions::new().write(true).open(path)?;
    f.sync_all()
}

/// Fsync a directory to make rename operations durable.
///
/// On Unix, this flushes directory metadata (new/renamed entries).
/// On Windows, directory sync is not supported; the OS handles durability.
#[allow(clippy::unnecessary_wraps)] // Returns Result on Unix, no-op on Windows
fn sync_dir(path: &Path) -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        let f = std::fs::File::open(path)?;
        f.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// On-disk form of one row.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    prefix: String,
    partition: i32,
    payload: Vec<u8>,
}

/// Filesystem-backed transactional row store.
///
/// Suited to single-node deployments where the checkpoint table is small
/// (one row per partition). The file lock serializes transactions within
/// the process; the store assumes one process owns the file.
pub struct FsTableStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FsTableStore {
    /// Creates a store backed by the file at `path`.
    ///
    /// The file is created lazily on the first committed transaction.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<RowKey, Vec<u8>>, TableError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        let rows: Vec<StoredRow> = serde_json::from_str(&json)?;
        Ok(rows
            .into_iter()
            .map(|r| (RowKey::new(r.prefix, r.partition), r.payload))
            .collect())
    }

    fn commit(&self, rows: &HashMap<RowKey, Vec<u8>>) -> Result<(), TableError> {
        let mut stored: Vec<StoredRow> = rows
            .iter()
            .map(|(key, payload)| StoredRow {
                prefix: key.prefix.clone(),
                partition: key.partition,
                payload: payload.clone(),
            })
            .collect();
        // Deterministic file contents regardless of map iteration order.
        stored.sort_by(|a, b| (&a.prefix, a.partition).cmp(&(&b.prefix, b.partition)));
        let json = serde_json::to_string(&stored)?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        // Write to a temp file, fsync, then rename for atomic durability
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        sync_file(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        sync_dir(parent)?;
        Ok(())
    }
}

impl TransactionRunner for FsTableStore {
    fn run<T, F>(&self, mut op: F) -> Result<T, TableError>
    where
        F: FnMut(&mut dyn CheckpointTable) -> Result<T, TableError>,
    {
        let _guard = self.lock.lock();

        let mut rows = self.load()?;
        let mut staged = StagedTable::new(&rows);
        let out = op(&mut staged)?;
        let writes = staged.into_staged();

        if !writes.is_empty() {
            rows.extend(writes);
            self.commit(&rows)?;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for FsTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsTableStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
