//! Local filesystem implementation of the [`Storage`] contract.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::location::{AppendStream, FileMode, Storage, StorageError};

/// Buffer size for append streams.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Applies a permission mode to a path.
///
/// On non-unix targets modes are accepted but not applied; the OS default
/// permissions are used instead.
#[allow(clippy::unnecessary_wraps)] // io::Result on unix, no-op elsewhere
fn set_mode(path: &Path, mode: FileMode) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode.bits()))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Local filesystem storage.
///
/// Streams are buffered writers over append-mode files; [`AppendStream::sync`]
/// maps to `fdatasync`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl LocalStorage {
    /// Creates a local filesystem storage backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Creates every missing component of `dir`, applying `mode` to the ones
    /// this call creates. Existing directories keep their permissions.
    fn create_dirs_with_mode(dir: &Path, mode: FileMode) -> io::Result<()> {
        let mut current = PathBuf::new();
        for component in dir.components() {
            current.push(component);
            if current.as_os_str().is_empty() || current.exists() {
                continue;
            }
            match std::fs::create_dir(&current) {
                Ok(()) => set_mode(&current, mode)?,
                // Lost a create race with another thread; the winner set the mode.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    fn create(
        &self,
        path: &Path,
        dir_mode: FileMode,
        file_mode: FileMode,
    ) -> Result<Box<dyn AppendStream>, StorageError> {
        if let Some(parent) = path.parent() {
            Self::create_dirs_with_mode(parent, dir_mode)?;
        }

        let existed = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if !existed {
            set_mode(path, file_mode)?;
        }

        Ok(Box::new(LocalAppendStream {
            path: path.to_path_buf(),
            writer: Some(BufWriter::with_capacity(STREAM_BUFFER_SIZE, file)),
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<(), StorageError> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        Ok(path.exists())
    }

    fn len(&self, path: &Path) -> Result<u64, StorageError> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Buffered append stream over a local file.
struct LocalAppendStream {
    path: PathBuf,
    /// `None` once the stream has been closed.
    writer: Option<BufWriter<File>>,
}

impl LocalAppendStream {
    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "stream already closed")
        })
    }
}

impl Write for LocalAppendStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl AppendStream for LocalAppendStream {
    fn sync(&mut self) -> Result<(), StorageError> {
        let writer = self.writer.as_mut().ok_or_else(|| StorageError::Closed {
            path: self.path.display().to_string(),
        })?;
        writer.flush()?;
        // fdatasync is enough; file length grows with the data it covers.
        writer.get_ref().sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        let writer = self.writer.as_mut().ok_or_else(|| StorageError::Closed {
            path: self.path.display().to_string(),
        })?;
        // The handle stays in place until every step passes, so a failed
        // close can be retried.
        writer.flush()?;
        writer.get_ref().sync_all()?;
        self.writer = None;
        Ok(())
    }
}
