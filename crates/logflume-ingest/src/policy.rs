//! Rollover policies.
//!
//! Two contracts keep rollover *mechanics* apart from rollover *policy*:
//! a [`TriggeringPolicy`] decides whether an incoming event must roll the
//! stream over, a [`RollingPolicy`] executes the rollover through a release
//! callback supplied by the router. The router is agnostic to which variants
//! are wired in.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use logflume_storage::{Storage, StorageError};

use crate::event::LogEvent;
use crate::stream::StreamStats;

/// Errors from executing a rollover. Distinct from write failures so the
/// router can report them separately.
#[derive(Debug, thiserror::Error)]
pub enum RolloverError {
    /// The release callback failed; the old stream could not be closed and
    /// has been parked for retry. No segment was archived.
    #[error("failed to release the active segment: {0}")]
    Release(#[source] StorageError),

    /// The closed segment could not be archived (renamed/pruned).
    #[error("failed to archive the closed segment: {0}")]
    Archive(#[source] StorageError),
}

/// Release callback handed to a rolling policy.
///
/// Invoking it removes the stream from the active table and closes it; on
/// failure the stream is parked in the invalid slot and the error returned.
pub type ReleaseFn<'a> = &'a mut dyn FnMut() -> Result<(), StorageError>;

/// Decides whether an event must trigger a rollover.
///
/// Pure decision logic: implementations see the candidate event and the
/// stream's accounting snapshot, nothing else. The byte count in the
/// snapshot is the writer-side authoritative count, not a backend-reported
/// size.
pub trait TriggeringPolicy: Send + Sync {
    /// Lifecycle hook invoked when the appender starts.
    fn start(&self) {}

    /// Lifecycle hook invoked when the appender stops.
    fn stop(&self) {}

    /// Whether appending `event` must roll the stream over first.
    fn is_triggering(&self, event: &LogEvent, stream: &StreamStats) -> bool;
}

/// Executes a rollover for the active segment at `active`.
pub trait RollingPolicy: Send + Sync {
    /// Lifecycle hook invoked when the appender starts.
    fn start(&self) {}

    /// Lifecycle hook invoked when the appender stops.
    fn stop(&self) {}

    /// Finalizes the segment at `active`: invokes `release` to close the
    /// stream, then archives the closed segment.
    ///
    /// # Errors
    ///
    /// Returns [`RolloverError::Release`] if the close failed (the stream is
    /// already parked; nothing was archived) or [`RolloverError::Archive`]
    /// if archiving failed after a successful close.
    fn rollover(
        &self,
        storage: &dyn Storage,
        active: &Path,
        release: ReleaseFn<'_>,
    ) -> Result<(), RolloverError>;
}

/// Triggers when the stream's byte count reaches a threshold.
#[derive(Debug, Clone, Copy)]
pub struct SizeTriggeringPolicy {
    max_bytes: u64,
}

impl SizeTriggeringPolicy {
    /// Triggers once `max_bytes` have been written to the active segment.
    #[must_use]
    pub const fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl TriggeringPolicy for SizeTriggeringPolicy {
    fn is_triggering(&self, _event: &LogEvent, stream: &StreamStats) -> bool {
        stream.bytes_written >= self.max_bytes
    }
}

/// Triggers when the active segment has been open for too long, measured in
/// event time.
#[derive(Debug, Clone, Copy)]
pub struct AgeTriggeringPolicy {
    max_age_ms: i64,
}

impl AgeTriggeringPolicy {
    /// Triggers once the event timestamp is `max_age_ms` past the segment's
    /// open time.
    #[must_use]
    pub const fn new(max_age_ms: i64) -> Self {
        Self { max_age_ms }
    }
}

impl TriggeringPolicy for AgeTriggeringPolicy {
    fn is_triggering(&self, event: &LogEvent, stream: &StreamStats) -> bool {
        event.timestamp_ms() - stream.opened_at_ms >= self.max_age_ms
    }
}

/// Triggers when any of its member policies triggers.
#[derive(Default)]
pub struct CompositeTriggeringPolicy {
    policies: Vec<Box<dyn TriggeringPolicy>>,
}

impl CompositeTriggeringPolicy {
    /// Creates an empty composite; with no members it never triggers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member policy.
    #[must_use]
    pub fn with(mut self, policy: Box<dyn TriggeringPolicy>) -> Self {
        self.policies.push(policy);
        self
    }
}

impl TriggeringPolicy for CompositeTriggeringPolicy {
    fn start(&self) {
        for policy in &self.policies {
            policy.start();
        }
    }

    fn stop(&self) {
        for policy in &self.policies {
            policy.stop();
        }
    }

    fn is_triggering(&self, event: &LogEvent, stream: &StreamStats) -> bool {
        self.policies.iter().any(|p| p.is_triggering(event, stream))
    }
}

/// Appends `.{index}` to a path, keeping the original extension.
fn numbered(path: &Path, index: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Maps storage failures during archiving to [`RolloverError::Archive`].
fn archived<T>(result: Result<T, StorageError>) -> Result<T, RolloverError> {
    result.map_err(RolloverError::Archive)
}

/// Fixed-window segment archiving.
///
/// The closed segment becomes `name.1`, shifting `name.1 → name.2` and so on
/// up to `max_backups`; the oldest backup beyond the window is deleted. With
/// a window of zero the closed segment is deleted outright.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindowRollingPolicy {
    max_backups: usize,
}

impl FixedWindowRollingPolicy {
    /// Keeps at most `max_backups` archived segments per stream.
    #[must_use]
    pub const fn new(max_backups: usize) -> Self {
        Self { max_backups }
    }
}

impl RollingPolicy for FixedWindowRollingPolicy {
    fn rollover(
        &self,
        storage: &dyn Storage,
        active: &Path,
        release: ReleaseFn<'_>,
    ) -> Result<(), RolloverError> {
        release().map_err(RolloverError::Release)?;

        if self.max_backups == 0 {
            return archived(storage.delete(active));
        }

        let oldest = numbered(active, self.max_backups);
        if archived(storage.exists(&oldest))? {
            archived(storage.delete(&oldest))?;
        }
        for index in (1..self.max_backups).rev() {
            let from = numbered(active, index);
            if archived(storage.exists(&from))? {
                archived(storage.rename(&from, &numbered(active, index + 1)))?;
            }
        }
        archived(storage.rename(active, &numbered(active, 1)))
    }
}
