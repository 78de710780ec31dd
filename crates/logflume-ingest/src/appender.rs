//! The rolling appender: routes events to per-identity streams.
//!
//! Runs synchronously on whatever thread delivers an event. Per-event
//! failures are logged and surfaced through [`AppendOutcome`] only; the
//! producing call path must never be disrupted by its own logging.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use logflume_storage::{Storage, StorageError};

use crate::config::{AppenderConfig, ConfigError};
use crate::event::{LogEvent, TAG_NAMESPACE};
use crate::identity::StreamIdentity;
use crate::manager::LocationManager;
use crate::policy::{RollingPolicy, RolloverError, TriggeringPolicy};
use crate::stream::ManagedStream;

/// Terminal state of one append.
#[derive(Debug)]
pub enum AppendOutcome {
    /// The event payload was written to its stream.
    Written,
    /// The event was deliberately excluded (internal namespace, or no
    /// routable identity). Not an error.
    Skipped,
    /// The event was dropped for this attempt; the next event retries from
    /// scratch. Already logged; carried here as the best-effort signal.
    Failed(AppendError),
}

/// Per-event failures, distinct by kind.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    /// Creating or opening the stream failed.
    #[error("failed to create stream: {0}")]
    Create(#[source] StorageError),

    /// Writing to an open stream failed. The stream is left as-is.
    #[error("failed to write event: {0}")]
    Write(#[source] StorageError),
}

/// Routes structured log events to rolling per-identity streams.
pub struct RollingAppender {
    storage: Arc<dyn Storage>,
    manager: LocationManager,
    triggering: Box<dyn TriggeringPolicy>,
    rolling: Box<dyn RollingPolicy>,
    file_path: String,
    max_inactive_ms: Option<i64>,
    excluded_namespace: String,
}

impl RollingAppender {
    /// Starts an appender for one program instance.
    ///
    /// Validates the configuration, substitutes the instance id into the
    /// file path template once, and invokes the policies' start hooks.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if required settings are missing or invalid;
    /// the appender must not start in that case.
    pub fn new(
        config: &AppenderConfig,
        instance_id: u32,
        storage: Arc<dyn Storage>,
        triggering: Box<dyn TriggeringPolicy>,
        rolling: Box<dyn RollingPolicy>,
    ) -> Result<Self, ConfigError> {
        let (dir_mode, file_mode) = config.validate()?;
        let file_path = config.resolved_file_path(instance_id);

        triggering.start();
        rolling.start();

        let manager = LocationManager::new(
            Arc::clone(&storage),
            config.base_path.clone(),
            dir_mode,
            file_mode,
        );
        info!(base_path = %config.base_path.display(), %file_path, "starting rolling appender");

        Ok(Self {
            storage,
            manager,
            triggering,
            rolling,
            file_path,
            max_inactive_ms: config.max_inactive_ms,
            excluded_namespace: config.excluded_namespace.clone(),
        })
    }

    /// The location manager owning this appender's streams.
    #[must_use]
    pub fn manager(&self) -> &LocationManager {
        &self.manager
    }

    /// Routes one event.
    ///
    /// Never panics and never returns an error: recoverable failures are
    /// logged and reported through the outcome.
    pub fn append(&self, event: &LogEvent) -> AppendOutcome {
        if event.tag(TAG_NAMESPACE) == Some(self.excluded_namespace.as_str()) {
            return AppendOutcome::Skipped;
        }

        let identity = match StreamIdentity::resolve(event) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("skipping event without stream identity: {e}");
                return AppendOutcome::Skipped;
            }
        };

        let now_ms = wall_clock_ms();

        // Retry the parked stream before anything else; its failure must not
        // block the current event.
        if let Err(e) = self.manager.retry_invalid() {
            warn!("parked stream still failing to close: {e}");
        }

        if let Some(max_inactive_ms) = self.max_inactive_ms {
            self.manager.close_if_idle(&identity, now_ms, max_inactive_ms);
        }

        // Rollover applies only to an already-open stream; a fresh stream is
        // written directly.
        if let Some(handle) = self.manager.active(&identity) {
            let (stats, active_path) = {
                let stream = handle.lock();
                (stream.stats(), stream.path().to_path_buf())
            };
            drop(handle);
            if self.triggering.is_triggering(event, &stats) {
                if let Err(e) = self.rollover(&identity, &active_path) {
                    warn!(%identity, "rollover failed: {e}");
                }
            }
        }

        match self.manager.get_or_create(&identity, &self.file_path, now_ms) {
            Ok(handle) => {
                let mut stream = handle.lock();
                match stream.write(event.payload(), now_ms) {
                    Ok(()) => AppendOutcome::Written,
                    Err(e) => {
                        warn!(%identity, "failed to write event: {e}");
                        AppendOutcome::Failed(AppendError::Write(e))
                    }
                }
            }
            Err(e) => {
                warn!(%identity, "failed to create stream: {e}");
                AppendOutcome::Failed(AppendError::Create(e))
            }
        }
    }

    /// Executes the rolling policy for `identity`'s active segment.
    ///
    /// The release callback removes the identity from the active table and
    /// closes the stream; a close failure parks it in the invalid slot and
    /// surfaces here as [`RolloverError::Release`]. Either way the identity
    /// is gone from the table, so the triggering event proceeds against a
    /// freshly opened stream.
    fn rollover(
        &self,
        identity: &StreamIdentity,
        active_path: &std::path::Path,
    ) -> Result<(), RolloverError> {
        let manager = &self.manager;
        let mut release = || manager.release(identity, ManagedStream::close);
        self.rolling
            .rollover(self.storage.as_ref(), active_path, &mut release)
    }

    /// Flushes every open stream; per-stream failures are logged.
    pub fn flush(&self) {
        for (identity, e) in self.manager.flush_all() {
            warn!(%identity, "failed to flush stream: {e}");
        }
    }

    /// Syncs every open stream; per-stream failures are logged.
    pub fn sync(&self) {
        for (identity, e) in self.manager.sync_all() {
            warn!(%identity, "failed to sync stream: {e}");
        }
    }

    /// Stops the appender: policy stop hooks, then close-all.
    pub fn close(&self) {
        info!("stopping rolling appender");
        self.triggering.stop();
        self.rolling.stop();
        for e in self.manager.close_all() {
            warn!("failed to close stream during shutdown: {e}");
        }
    }

    /// Resolved file path below each stream directory.
    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Full path of the active segment for `identity`, if one is open.
    #[must_use]
    pub fn active_path(&self, identity: &StreamIdentity) -> Option<PathBuf> {
        self.manager
            .active(identity)
            .map(|handle| handle.lock().path().to_path_buf())
    }
}

impl std::fmt::Debug for RollingAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingAppender")
            .field("file_path", &self.file_path)
            .field("excluded_namespace", &self.excluded_namespace)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)] // ms since epoch fits i64 far beyond this code's lifetime
fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
