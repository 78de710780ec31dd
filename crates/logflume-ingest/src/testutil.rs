//! Mock storage backends shared by the unit tests.

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use logflume_storage::{AppendStream, FileMode, Storage, StorageError};

/// Storage that counts create calls and discards all bytes.
#[derive(Debug, Default)]
pub struct CountingStorage {
    creates: AtomicUsize,
}

impl CountingStorage {
    /// Number of create calls observed.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

impl Storage for CountingStorage {
    fn create(
        &self,
        _path: &Path,
        _dir_mode: FileMode,
        _file_mode: FileMode,
    ) -> Result<Box<dyn AppendStream>, StorageError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SinkStream {
            flags: Arc::new(Flags::default()),
        }))
    }

    fn rename(&self, _from: &Path, _to: &Path) -> Result<(), StorageError> {
        Ok(())
    }

    fn delete(&self, _path: &Path) -> Result<(), StorageError> {
        Ok(())
    }

    fn exists(&self, _path: &Path) -> Result<bool, StorageError> {
        Ok(false)
    }

    fn len(&self, _path: &Path) -> Result<u64, StorageError> {
        Ok(0)
    }
}

#[derive(Debug, Default)]
struct Flags {
    fail_write: AtomicBool,
    fail_sync: AtomicBool,
    fail_close: AtomicBool,
}

/// Storage whose streams fail selected operations until healed.
#[derive(Debug, Default)]
pub struct FailingStorage {
    creates: AtomicUsize,
    fail_create: AtomicBool,
    fail_rename: AtomicBool,
    flags: Arc<Flags>,
}

impl FailingStorage {
    /// Storage whose streams fail `close`.
    pub fn fail_closes() -> Self {
        let storage = Self::default();
        storage.flags.fail_close.store(true, Ordering::SeqCst);
        storage
    }

    /// Storage whose streams fail `sync`.
    pub fn fail_syncs() -> Self {
        let storage = Self::default();
        storage.flags.fail_sync.store(true, Ordering::SeqCst);
        storage
    }

    /// Storage whose streams fail `write`.
    pub fn fail_writes() -> Self {
        let storage = Self::default();
        storage.flags.fail_write.store(true, Ordering::SeqCst);
        storage
    }

    /// Storage that fails `create` itself.
    pub fn fail_creates() -> Self {
        let storage = Self::default();
        storage.fail_create.store(true, Ordering::SeqCst);
        storage
    }

    /// Storage that fails `rename`, to break segment archiving.
    pub fn fail_renames() -> Self {
        let storage = Self::default();
        storage.fail_rename.store(true, Ordering::SeqCst);
        storage
    }

    /// Clears every failure flag; existing streams heal too.
    pub fn heal(&self) {
        self.fail_create.store(false, Ordering::SeqCst);
        self.fail_rename.store(false, Ordering::SeqCst);
        self.flags.fail_write.store(false, Ordering::SeqCst);
        self.flags.fail_sync.store(false, Ordering::SeqCst);
        self.flags.fail_close.store(false, Ordering::SeqCst);
    }

    /// Number of create calls observed.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

fn broken(op: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("{op} failed")))
}

impl Storage for FailingStorage {
    fn create(
        &self,
        _path: &Path,
        _dir_mode: FileMode,
        _file_mode: FileMode,
    ) -> Result<Box<dyn AppendStream>, StorageError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(broken("create"));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SinkStream {
            flags: Arc::clone(&self.flags),
        }))
    }

    fn rename(&self, _from: &Path, _to: &Path) -> Result<(), StorageError> {
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(broken("rename"));
        }
        Ok(())
    }

    fn delete(&self, _path: &Path) -> Result<(), StorageError> {
        Ok(())
    }

    fn exists(&self, _path: &Path) -> Result<bool, StorageError> {
        Ok(false)
    }

    fn len(&self, _path: &Path) -> Result<u64, StorageError> {
        Ok(0)
    }
}

struct SinkStream {
    flags: Arc<Flags>,
}

impl Write for SinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.flags.fail_write.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "write failed"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AppendStream for SinkStream {
    fn sync(&mut self) -> Result<(), StorageError> {
        if self.flags.fail_sync.load(Ordering::SeqCst) {
            return Err(broken("sync"));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        if self.flags.fail_close.load(Ordering::SeqCst) {
            return Err(broken("close"));
        }
        Ok(())
    }
}
