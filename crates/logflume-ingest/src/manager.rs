//! Ownership of the currently open streams.
//!
//! The [`LocationManager`] owns every open [`ManagedStream`], keyed by
//! [`StreamIdentity`]. Creation is serialized under the table lock, so two
//! producer threads racing on the same identity observe exactly one create.
//! A stream whose close failed is parked in a single retry slot and retried
//! on a later append before any other work proceeds.

use std::path::PathBuf;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use logflume_storage::{FileMode, Storage, StorageError};

use crate::identity::StreamIdentity;
use crate::stream::ManagedStream;

/// Shared handle to one managed stream.
///
/// The manager serializes creation; writes go through the per-stream mutex,
/// which producers for a single identity are expected not to contend on
/// (upstream logging frameworks serialize per destination).
pub type StreamHandle = Arc<Mutex<ManagedStream>>;

/// Owns the set of currently open streams.
pub struct LocationManager {
    storage: Arc<dyn Storage>,
    base_path: PathBuf,
    dir_mode: FileMode,
    file_mode: FileMode,
    active: Mutex<FxHashMap<StreamIdentity, StreamHandle>>,
    /// At most one stream that failed to close; retried before other work.
    invalid: Mutex<Option<StreamHandle>>,
}

impl LocationManager {
    /// Creates a manager rooted at `base_path`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        base_path: PathBuf,
        dir_mode: FileMode,
        file_mode: FileMode,
    ) -> Self {
        Self {
            storage,
            base_path,
            dir_mode,
            file_mode,
            active: Mutex::new(FxHashMap::default()),
            invalid: Mutex::new(None),
        }
    }

    /// Number of open streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether no stream is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    /// Returns the open stream for `identity`, if any.
    #[must_use]
    pub fn active(&self, identity: &StreamIdentity) -> Option<StreamHandle> {
        self.active.lock().get(identity).cloned()
    }

    /// Whether a stream that failed to close is parked for retry.
    #[must_use]
    pub fn has_invalid(&self) -> bool {
        self.invalid.lock().is_some()
    }

    /// Returns the existing stream for `identity`, or creates one.
    ///
    /// A new stream's file lives at `base_path/<namespace>/<application>/`
    /// joined with `file_path`; missing directories are created with the
    /// configured directory mode. The table lock is held across creation so
    /// that concurrent appends for one identity open exactly one stream.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if directory or file creation fails; nothing
    /// is registered in that case and the next append retries from scratch.
    pub fn get_or_create(
        &self,
        identity: &StreamIdentity,
        file_path: &str,
        now_ms: i64,
    ) -> Result<StreamHandle, StorageError> {
        let mut active = self.active.lock();
        if let Some(handle) = active.get(identity) {
            return Ok(Arc::clone(handle));
        }

        let path = self
            .base_path
            .join(identity.relative_dir())
            .join(file_path);
        let stream = self.storage.create(&path, self.dir_mode, self.file_mode)?;
        debug!(%identity, path = %path.display(), "opened log stream");

        let handle = Arc::new(Mutex::new(ManagedStream::new(path, stream, now_ms)));
        active.insert(identity.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Removes `identity` from the table and runs `close` on its stream.
    ///
    /// On close failure the stream is parked in the invalid slot rather than
    /// dropped, so the close can be retried by a later append. If the slot
    /// is already occupied the stream stays registered instead, keeping the
    /// single-slot invariant.
    ///
    /// # Errors
    ///
    /// Returns the error from `close`; the stream is parked (or left
    /// registered) as described above.
    pub fn release<F>(&self, identity: &StreamIdentity, close: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut ManagedStream) -> Result<(), StorageError>,
    {
        let Some(handle) = self.active.lock().remove(identity) else {
            return Ok(());
        };

        let result = close(&mut *handle.lock());
        if let Err(e) = result {
            let mut invalid = self.invalid.lock();
            if invalid.is_none() {
                *invalid = Some(handle);
            } else {
                // Slot taken; keep the stream registered so it is not lost.
                warn!(%identity, "invalid-stream slot occupied, keeping stream registered");
                self.active.lock().insert(identity.clone(), handle);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Retries the close of the parked stream, if any.
    ///
    /// Called from the append path before any other work. The slot is
    /// cleared only on a successful close; on failure the stream goes back
    /// in and the error is returned for the caller to log.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the retried close fails again.
    pub fn retry_invalid(&self) -> Result<(), StorageError> {
        let mut invalid = self.invalid.lock();
        let Some(handle) = invalid.take() else {
            return Ok(());
        };

        let result = handle.lock().close();
        match result {
            Ok(()) => {
                info!("closed previously failed stream");
                Ok(())
            }
            Err(e) => {
                *invalid = Some(handle);
                Err(e)
            }
        }
    }

    /// Closes the stream for `identity` if it has been idle for at least
    /// `max_inactive_ms`. Returns whether a stream was closed.
    ///
    /// Reaping scope is deliberately per-identity: appending to one identity
    /// never closes another identity's idle stream. A close failure parks
    /// the stream and is logged, not returned; the append proceeds.
    pub fn close_if_idle(
        &self,
        identity: &StreamIdentity,
        now_ms: i64,
        max_inactive_ms: i64,
    ) -> bool {
        let idle = self
            .active(identity)
            .is_some_and(|handle| now_ms - handle.lock().last_write_ms() >= max_inactive_ms);
        if !idle {
            return false;
        }

        debug!(%identity, "closing idle stream");
        match self.release(identity, ManagedStream::close) {
            Ok(()) => true,
            Err(e) => {
                warn!(%identity, "failed to close idle stream, parked for retry: {e}");
                true
            }
        }
    }

    /// Closes every stream idle for at least `max_inactive_ms`, returning
    /// how many were released. Idempotent: nothing idle, nothing closed.
    ///
    /// This is an explicit maintenance sweep; the append path only ever
    /// reaps the identity it is appending to.
    pub fn reap_idle(&self, now_ms: i64, max_inactive_ms: i64) -> usize {
        let idle: Vec<StreamIdentity> = self
            .active
            .lock()
            .iter()
            .filter(|(_, handle)| now_ms - handle.lock().last_write_ms() >= max_inactive_ms)
            .map(|(identity, _)| identity.clone())
            .collect();

        let mut closed = 0;
        for identity in idle {
            if self.close_if_idle(&identity, now_ms, max_inactive_ms) {
                closed += 1;
            }
        }
        closed
    }

    /// Flushes every open stream, collecting per-stream errors.
    pub fn flush_all(&self) -> Vec<(StreamIdentity, StorageError)> {
        self.for_each_active(ManagedStream::flush)
    }

    /// Syncs every open stream, collecting per-stream errors.
    pub fn sync_all(&self) -> Vec<(StreamIdentity, StorageError)> {
        self.for_each_active(ManagedStream::sync)
    }

    fn for_each_active<F>(&self, mut op: F) -> Vec<(StreamIdentity, StorageError)>
    where
        F: FnMut(&mut ManagedStream) -> Result<(), StorageError>,
    {
        let handles: Vec<(StreamIdentity, StreamHandle)> = self
            .active
            .lock()
            .iter()
            .map(|(identity, handle)| (identity.clone(), Arc::clone(handle)))
            .collect();

        let mut errors = Vec::new();
        for (identity, handle) in handles {
            if let Err(e) = op(&mut *handle.lock()) {
                errors.push((identity, e));
            }
        }
        errors
    }

    /// Closes everything at shutdown: the invalid slot is drained first,
    /// then every active stream. Errors are collected, not fatal to the
    /// remaining streams.
    pub fn close_all(&self) -> Vec<StorageError> {
        let mut errors = Vec::new();

        if let Some(handle) = self.invalid.lock().take() {
            if let Err(e) = handle.lock().close() {
                errors.push(e);
            }
        }

        let drained: Vec<StreamHandle> = {
            let mut active = self.active.lock();
            let drained = active.values().map(Arc::clone).collect();
            active.clear();
            drained
        };
        for handle in drained {
            if let Err(e) = handle.lock().close() {
                errors.push(e);
            }
        }
        errors
    }
}

impl std::fmt::Debug for LocationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationManager")
            .field("base_path", &self.base_path)
            .field("open_streams", &self.len())
            .field("has_invalid", &self.has_invalid())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CountingStorage, FailingStorage};
    use logflume_storage::LocalStorage;
    use tempfile::TempDir;

    fn modes() -> (FileMode, FileMode) {
        (FileMode::parse("750").unwrap(), FileMode::parse("640").unwrap())
    }

    fn local_manager(dir: &TempDir) -> LocationManager {
        let (dir_mode, file_mode) = modes();
        LocationManager::new(
            Arc::new(LocalStorage::new()),
            dir.path().to_path_buf(),
            dir_mode,
            file_mode,
        )
    }

    #[test]
    fn test_get_or_create_reuses_stream() {
        let dir = TempDir::new().unwrap();
        let manager = local_manager(&dir);
        let identity = StreamIdentity::new("ns", "app");

        let a = manager.get_or_create(&identity, "program.log", 0).unwrap();
        let b = manager.get_or_create(&identity, "program.log", 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_streams_land_under_identity_dirs() {
        let dir = TempDir::new().unwrap();
        let manager = local_manager(&dir);

        manager
            .get_or_create(&StreamIdentity::new("ns", "app"), "program.log", 0)
            .unwrap();
        assert!(dir.path().join("ns/app/program.log").exists());
    }

    #[test]
    fn test_concurrent_appends_create_once() {
        let storage = Arc::new(CountingStorage::default());
        let (dir_mode, file_mode) = modes();
        let manager = LocationManager::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            PathBuf::from("/logs"),
            dir_mode,
            file_mode,
        );
        let identity = StreamIdentity::new("ns", "app");

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let handle = manager.get_or_create(&identity, "program.log", 0).unwrap();
                    handle.lock().write(b"event", 0).unwrap();
                });
            }
        });

        assert_eq!(storage.creates(), 1);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_release_removes_and_closes() {
        let dir = TempDir::new().unwrap();
        let manager = local_manager(&dir);
        let identity = StreamIdentity::new("ns", "app");

        manager.get_or_create(&identity, "program.log", 0).unwrap();
        manager.release(&identity, ManagedStream::close).unwrap();

        assert!(manager.active(&identity).is_none());
        assert!(!manager.has_invalid());
    }

    #[test]
    fn test_release_of_unknown_identity_is_noop() {
        let dir = TempDir::new().unwrap();
        let manager = local_manager(&dir);
        manager
            .release(&StreamIdentity::new("ns", "ghost"), ManagedStream::close)
            .unwrap();
    }

    #[test]
    fn test_failed_close_parks_stream() {
        let storage = Arc::new(FailingStorage::fail_closes());
        let (dir_mode, file_mode) = modes();
        let manager = LocationManager::new(
            storage as Arc<dyn Storage>,
            PathBuf::from("/logs"),
            dir_mode,
            file_mode,
        );
        let identity = StreamIdentity::new("ns", "app");

        manager.get_or_create(&identity, "program.log", 0).unwrap();
        let result = manager.release(&identity, ManagedStream::close);

        assert!(result.is_err());
        assert!(manager.active(&identity).is_none());
        assert!(manager.has_invalid());
    }

    #[test]
    fn test_retry_invalid_clears_slot_on_success() {
        let storage = Arc::new(FailingStorage::fail_closes());
        let (dir_mode, file_mode) = modes();
        let manager = LocationManager::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            PathBuf::from("/logs"),
            dir_mode,
            file_mode,
        );
        let identity = StreamIdentity::new("ns", "app");

        manager.get_or_create(&identity, "program.log", 0).unwrap();
        manager.release(&identity, ManagedStream::close).unwrap_err();

        // Still failing: slot stays occupied.
        assert!(manager.retry_invalid().is_err());
        assert!(manager.has_invalid());

        storage.heal();
        manager.retry_invalid().unwrap();
        assert!(!manager.has_invalid());
    }

    #[test]
    fn test_idle_close_is_per_identity() {
        let dir = TempDir::new().unwrap();
        let manager = local_manager(&dir);
        let a = StreamIdentity::new("ns", "a");
        let b = StreamIdentity::new("ns", "b");

        manager.get_or_create(&a, "program.log", 0).unwrap();
        manager.get_or_create(&b, "program.log", 5_000).unwrap();

        // Identity a is idle by now, but a check against b must not touch it.
        assert!(!manager.close_if_idle(&b, 6_000, 10_000));
        assert!(manager.active(&a).is_some());

        assert!(manager.close_if_idle(&a, 6_000, 1_000));
        assert!(manager.active(&a).is_none());
        assert!(manager.active(&b).is_some());
    }

    #[test]
    fn test_reap_idle_sweep_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = local_manager(&dir);

        manager
            .get_or_create(&StreamIdentity::new("ns", "a"), "program.log", 0)
            .unwrap();
        manager
            .get_or_create(&StreamIdentity::new("ns", "b"), "program.log", 100)
            .unwrap();

        assert_eq!(manager.reap_idle(10_000, 1_000), 2);
        assert_eq!(manager.reap_idle(10_000, 1_000), 0);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_flush_and_sync_collect_errors() {
        let storage = Arc::new(FailingStorage::fail_syncs());
        let (dir_mode, file_mode) = modes();
        let manager = LocationManager::new(
            storage as Arc<dyn Storage>,
            PathBuf::from("/logs"),
            dir_mode,
            file_mode,
        );

        manager
            .get_or_create(&StreamIdentity::new("ns", "a"), "program.log", 0)
            .unwrap();
        manager
            .get_or_create(&StreamIdentity::new("ns", "b"), "program.log", 0)
            .unwrap();

        assert!(manager.flush_all().is_empty());
        let errors = manager.sync_all();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_close_all_drains_invalid_first() {
        let storage = Arc::new(FailingStorage::fail_closes());
        let (dir_mode, file_mode) = modes();
        let manager = LocationManager::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            PathBuf::from("/logs"),
            dir_mode,
            file_mode,
        );

        let a = StreamIdentity::new("ns", "a");
        manager.get_or_create(&a, "program.log", 0).unwrap();
        manager.release(&a, ManagedStream::close).unwrap_err();
        manager
            .get_or_create(&StreamIdentity::new("ns", "b"), "program.log", 0)
            .unwrap();

        storage.heal();
        let errors = manager.close_all();
        assert!(errors.is_empty());
        assert!(manager.is_empty());
        assert!(!manager.has_invalid());
    }
}
