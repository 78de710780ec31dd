//! Durable file location contracts shared by every storage backend.
//!
//! A [`Storage`] hands out [`AppendStream`]s for paths it owns. Creation takes
//! explicit directory and file permission modes because log destinations are
//! typically shared between the writing service and a reading pipeline with a
//! different unix user.

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Errors from storage location operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error from the underlying backend.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A permission mode string that is neither octal nor symbolic.
    #[error("invalid permission mode {mode:?}: {reason}")]
    InvalidMode {
        /// The rejected mode string.
        mode: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The stream was closed and cannot accept further operations.
    #[error("stream for {path} is closed")]
    Closed {
        /// Path of the closed stream.
        path: String,
    },
}

/// A parsed permission mode, as applied to created files and directories.
///
/// Accepts the two forms that appear in deployment configs: octal strings
/// (`"750"`) and 9-character symbolic strings (`"rwxr-x---"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    /// Returns the raw mode bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Parses an octal (`"640"`) or symbolic (`"rw-r-----"`) mode string.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidMode`] if the string is neither form.
    pub fn parse(mode: &str) -> Result<Self, StorageError> {
        if mode.len() == 9 {
            return Self::parse_symbolic(mode);
        }
        if (3..=4).contains(&mode.len()) && mode.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            let bits = u32::from_str_radix(mode, 8).map_err(|_| StorageError::InvalidMode {
                mode: mode.to_string(),
                reason: "not a valid octal number",
            })?;
            return Ok(Self(bits));
        }
        Err(StorageError::InvalidMode {
            mode: mode.to_string(),
            reason: "expected 3-4 octal digits or a 9-character symbolic mode",
        })
    }

    fn parse_symbolic(mode: &str) -> Result<Self, StorageError> {
        let mut bits = 0u32;
        for (i, c) in mode.chars().enumerate() {
            let expected = match i % 3 {
                0 => 'r',
                1 => 'w',
                _ => 'x',
            };
            match c {
                '-' => {}
                c if c == expected => bits |= 1 << (8 - i),
                _ => {
                    return Err(StorageError::InvalidMode {
                        mode: mode.to_string(),
                        reason: "symbolic mode must match the rwxrwxrwx template",
                    })
                }
            }
        }
        Ok(Self(bits))
    }
}

impl FromStr for FileMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One open append handle to a durable location.
///
/// Implementations buffer internally; [`Write::flush`] pushes buffered bytes
/// to the backend, [`AppendStream::sync`] additionally makes them durable.
pub trait AppendStream: Write + Send {
    /// Flushes buffered bytes and makes them durable on the backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the flush or the durability barrier fails.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Flushes, syncs and releases the underlying handle.
    ///
    /// A stream on which `close` has failed may be retried; a stream on which
    /// it has succeeded returns [`StorageError::Closed`] for every later
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the final flush or release fails.
    fn close(&mut self) -> Result<(), StorageError>;
}

/// Durable-file abstraction over a storage backend.
///
/// The ingestion core is written against this contract so that the same
/// pipeline can target a local disk, a mounted remote filesystem, or an
/// object-store gateway.
pub trait Storage: Send + Sync {
    /// Creates (or reopens) `path` for appending.
    ///
    /// Missing parent directories are created with `dir_mode`; a newly
    /// created file gets `file_mode`. Reopening an existing file leaves its
    /// permissions untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if directory or file creation fails.
    fn create(
        &self,
        path: &Path,
        dir_mode: FileMode,
        file_mode: FileMode,
    ) -> Result<Box<dyn AppendStream>, StorageError>;

    /// Renames `from` to `to` within the backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the rename fails.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError>;

    /// Deletes `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the delete fails.
    fn delete(&self, path: &Path) -> Result<(), StorageError>;

    /// Returns whether `path` exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if existence cannot be determined.
    fn exists(&self, path: &Path) -> Result<bool, StorageError>;

    /// Returns the backend-reported byte length of `path`.
    ///
    /// Some backends report sizes lazily; writers that need an exact count
    /// must track bytes themselves and treat this as advisory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the length cannot be read.
    fn len(&self, path: &Path) -> Result<u64, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(FileMode::parse("750").unwrap().bits(), 0o750);
        assert_eq!(FileMode::parse("644").unwrap().bits(), 0o644);
        assert_eq!(FileMode::parse("0640").unwrap().bits(), 0o640);
    }

    #[test]
    fn test_parse_symbolic_mode() {
        assert_eq!(FileMode::parse("rwxr-x---").unwrap().bits(), 0o750);
        assert_eq!(FileMode::parse("rw-r--r--").unwrap().bits(), 0o644);
        assert_eq!(FileMode::parse("---------").unwrap().bits(), 0);
        assert_eq!(FileMode::parse("rwxrwxrwx").unwrap().bits(), 0o777);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            FileMode::parse("95"),
            Err(StorageError::InvalidMode { .. })
        ));
        assert!(matches!(
            FileMode::parse("rwxr-x--"),
            Err(StorageError::InvalidMode { .. })
        ));
        assert!(matches!(
            FileMode::parse("rwxr-xr-q"),
            Err(StorageError::InvalidMode { .. })
        ));
        assert!(matches!(
            FileMode::parse("rwx"),
            Err(StorageError::InvalidMode { .. })
        ));
    }

    #[test]
    fn test_parse_symbolic_misplaced_letter() {
        // 'x' where 'r' belongs
        assert!(matches!(
            FileMode::parse("xwxr-x---"),
            Err(StorageError::InvalidMode { .. })
        ));
    }

    #[test]
    fn test_from_str() {
        let mode: FileMode = "700".parse().unwrap();
        assert_eq!(mode.bits(), 0o700);
    }
}
