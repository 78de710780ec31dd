//! Managed append streams and their accounting metadata.

use std::io::Write;
use std::path::{Path, PathBuf};

use logflume_storage::{AppendStream, StorageError};

/// Point-in-time accounting for one managed stream, handed to triggering
/// policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes written through this handle since it was opened.
    pub bytes_written: u64,
    /// When the stream was opened, milliseconds since the epoch.
    pub opened_at_ms: i64,
    /// When the stream was last written, milliseconds since the epoch.
    pub last_write_ms: i64,
}

/// One open append handle for a stream identity.
///
/// The byte counter is maintained here and is authoritative: some backends
/// report file sizes lazily (or not at all while a stream is open), so
/// rollover decisions must never depend on backend-reported lengths.
pub struct ManagedStream {
    path: PathBuf,
    stream: Box<dyn AppendStream>,
    bytes_written: u64,
    opened_at_ms: i64,
    last_write_ms: i64,
}

impl ManagedStream {
    /// Wraps a freshly opened append stream.
    #[must_use]
    pub fn new(path: PathBuf, stream: Box<dyn AppendStream>, now_ms: i64) -> Self {
        Self {
            path,
            stream,
            bytes_written: 0,
            opened_at_ms: now_ms,
            last_write_ms: now_ms,
        }
    }

    /// Path of the active segment.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written through this handle. Monotonically non-decreasing
    /// until the stream is closed.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// When the last write happened.
    #[must_use]
    pub const fn last_write_ms(&self) -> i64 {
        self.last_write_ms
    }

    /// Snapshot of the accounting state.
    #[must_use]
    pub const fn stats(&self) -> StreamStats {
        StreamStats {
            bytes_written: self.bytes_written,
            opened_at_ms: self.opened_at_ms,
            last_write_ms: self.last_write_ms,
        }
    }

    /// Appends `payload` and updates the accounting state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying write fails; the counter
    /// is not advanced in that case.
    pub fn write(&mut self, payload: &[u8], now_ms: i64) -> Result<(), StorageError> {
        self.stream.write_all(payload)?;
        #[allow(clippy::cast_possible_truncation)] // usize → u64: lossless on 64-bit
        let written = payload.len() as u64;
        self.bytes_written += written;
        self.last_write_ms = now_ms;
        Ok(())
    }

    /// Flushes buffered bytes to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the flush fails.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.stream.flush()?;
        Ok(())
    }

    /// Makes written bytes durable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the sync fails.
    pub fn sync(&mut self) -> Result<(), StorageError> {
        self.stream.sync()
    }

    /// Closes the underlying stream. Retryable on failure.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the close fails.
    pub fn close(&mut self) -> Result<(), StorageError> {
        self.stream.close()
    }
}

impl std::fmt::Debug for ManagedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedStream")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .field("opened_at_ms", &self.opened_at_ms)
            .field("last_write_ms", &self.last_write_ms)
            .finish_non_exhaustive()
    }
}
