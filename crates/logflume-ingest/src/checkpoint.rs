//! Per-partition offset checkpoints with change suppression.
//!
//! A [`CheckpointManager`] persists, for each logical partition, an opaque
//! offset plus the maximum observed event time, through a transactional
//! partitioned row store. A batch identical to the last durably written one
//! is skipped without touching storage; idle partitions re-report the same
//! progress every polling cycle.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use logflume_storage::{CheckpointRow, CheckpointTable, RowKey, TableError, TransactionRunner};

/// Max-event-time value of the sentinel checkpoint.
const NO_EVENT_TIME: i64 = -1;

/// Errors from checkpoint persistence.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The store rejected the transaction. Not retried here; retry policy
    /// belongs to the caller.
    #[error("checkpoint store error: {0}")]
    Store(#[from] TableError),

    /// A checkpoint could not be serialized for writing. Surfaced rather
    /// than swallowed: losing a checkpoint write risks duplicate
    /// reprocessing downstream.
    #[error("checkpoint serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted processing progress for one partition: an opaque offset plus
/// the maximum event time observed.
///
/// "No progress recorded yet" is an explicit sentinel ([`Checkpoint::none`],
/// absent offset and event time -1), never a null and never a zero offset,
/// since zero is a legitimate offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint<O> {
    offset: Option<O>,
    max_event_time: i64,
}

impl<O> Checkpoint<O> {
    /// The sentinel checkpoint.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            offset: None,
            max_event_time: NO_EVENT_TIME,
        }
    }

    /// A checkpoint at `offset` with the given maximum event time.
    #[must_use]
    pub const fn new(offset: O, max_event_time: i64) -> Self {
        Self {
            offset: Some(offset),
            max_event_time,
        }
    }

    /// The recorded offset, absent for the sentinel.
    #[must_use]
    pub const fn offset(&self) -> Option<&O> {
        self.offset.as_ref()
    }

    /// Maximum event time observed, -1 for the sentinel.
    #[must_use]
    pub const fn max_event_time(&self) -> i64 {
        self.max_event_time
    }

    /// Whether this is the sentinel.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.offset.is_none()
    }
}

impl<O> Default for Checkpoint<O> {
    fn default() -> Self {
        Self::none()
    }
}

/// Persists per-partition checkpoints through a transactional store.
///
/// One manager instance is the single logical writer for its row prefix;
/// concurrent saves with overlapping partitions would race on the cache.
pub struct CheckpointManager<O, R> {
    runner: R,
    row_prefix: String,
    /// Last values durably written, for change suppression.
    last_saved: Mutex<HashMap<i32, Checkpoint<O>>>,
}

impl<O, R> CheckpointManager<O, R>
where
    O: Serialize + DeserializeOwned + Clone + PartialEq,
    R: TransactionRunner,
{
    /// Creates a manager writing rows under `row_prefix`.
    pub fn new(runner: R, row_prefix: impl Into<String>) -> Self {
        Self {
            runner,
            row_prefix: row_prefix.into(),
            last_saved: Mutex::new(HashMap::new()),
        }
    }

    /// Persists a batch of checkpoints in one transaction.
    ///
    /// If the batch equals the last saved values this returns without
    /// touching the store. On success the cache is replaced with the
    /// offset/max-event-time pairs just written. A crash between commit and
    /// cache update costs at most one redundant future write.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if serialization or the transaction
    /// fails; the cache is left unchanged so the next save retries.
    pub fn save(&self, checkpoints: &HashMap<i32, Checkpoint<O>>) -> Result<(), CheckpointError> {
        {
            let last_saved = self.last_saved.lock();
            if *last_saved == *checkpoints {
                trace!(prefix = %self.row_prefix, "checkpoints unchanged, skipping save");
                return Ok(());
            }
        }

        let mut rows = Vec::with_capacity(checkpoints.len());
        for (&partition, checkpoint) in checkpoints {
            rows.push((partition, serde_json::to_vec(checkpoint)?));
        }

        self.runner.run(|table| {
            for (partition, payload) in &rows {
                table.upsert(CheckpointRow {
                    key: RowKey::new(self.row_prefix.clone(), *partition),
                    payload: payload.clone(),
                })?;
            }
            Ok(())
        })?;

        let mut last_saved = self.last_saved.lock();
        *last_saved = checkpoints
            .iter()
            .map(|(&partition, checkpoint)| (partition, checkpoint.clone()))
            .collect();
        trace!(
            prefix = %self.row_prefix,
            partitions = checkpoints.len(),
            "saved checkpoints"
        );
        Ok(())
    }

    /// Loads the checkpoints for `partitions` in one transaction.
    ///
    /// Every requested partition appears in the result; partitions with no
    /// stored row (or an undecodable one) map to the sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the transaction fails.
    pub fn load(&self, partitions: &[i32]) -> Result<HashMap<i32, Checkpoint<O>>, CheckpointError> {
        let checkpoints = self.runner.run(|table| {
            let mut checkpoints = HashMap::with_capacity(partitions.len());
            for &partition in partitions {
                let row = table.read(&RowKey::new(self.row_prefix.clone(), partition))?;
                checkpoints.insert(partition, Self::decode(partition, row));
            }
            Ok(checkpoints)
        })?;
        Ok(checkpoints)
    }

    /// Loads the checkpoint for one partition. Same contract as [`load`],
    /// not batched.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the transaction fails.
    ///
    /// [`load`]: CheckpointManager::load
    pub fn load_one(&self, partition: i32) -> Result<Checkpoint<O>, CheckpointError> {
        let checkpoint = self.runner.run(|table| {
            let row = table.read(&RowKey::new(self.row_prefix.clone(), partition))?;
            Ok(Self::decode(partition, row))
        })?;
        trace!(prefix = %self.row_prefix, partition, "read checkpoint");
        Ok(checkpoint)
    }

    /// Decodes a stored row; absent and undecodable rows are both "no
    /// checkpoint".
    fn decode(partition: i32, row: Option<CheckpointRow>) -> Checkpoint<O> {
        let Some(row) = row else {
            return Checkpoint::none();
        };
        match serde_json::from_slice(&row.payload) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(partition, "undecodable checkpoint row, treating as none: {e}");
                Checkpoint::none()
            }
        }
    }
}

impl<O, R> std::fmt::Debug for CheckpointManager<O, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("row_prefix", &self.row_prefix)
            .finish_non_exhaustive()
    }
}
