//! Appender configuration and startup validation.

use std::path::{Path, PathBuf};

use logflume_storage::{FileMode, StorageError};

/// Placeholder in the file path template replaced by the instance id once at
/// startup.
pub const INSTANCE_ID_PLACEHOLDER: &str = "{instance_id}";

/// Namespace excluded from user-visible logs by default.
pub const DEFAULT_EXCLUDED_NAMESPACE: &str = "system";

/// Errors from configuration validation. All of them are fatal at startup:
/// the appender must not start with a partial configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The base storage path is empty.
    #[error("base_path must name the log root directory")]
    MissingBasePath,

    /// The file path template is empty.
    #[error("file_path must name the log file within each stream directory")]
    MissingFilePath,

    /// No directory permission mode was configured.
    #[error("dir_permissions must be set")]
    MissingDirPermissions,

    /// No file permission mode was configured.
    #[error("file_permissions must be set")]
    MissingFilePermissions,

    /// A permission mode string could not be parsed.
    #[error("bad permission mode: {0}")]
    BadMode(#[source] StorageError),
}

/// Configuration for the rolling appender.
///
/// Built with [`AppenderConfig::new`] plus `with_*` setters, then checked
/// once with [`AppenderConfig::validate`] when the appender starts.
#[derive(Debug, Clone)]
pub struct AppenderConfig {
    /// Root directory for all log streams.
    pub base_path: PathBuf,
    /// File path template below each stream directory. May contain
    /// [`INSTANCE_ID_PLACEHOLDER`].
    pub file_path: String,
    /// Permission mode for created directories. Required.
    pub dir_permissions: Option<String>,
    /// Permission mode for created files. Required.
    pub file_permissions: Option<String>,
    /// Close a stream not written to for this long, checked on the append
    /// path for the stream's own identity. `None` disables idle closing.
    pub max_inactive_ms: Option<i64>,
    /// Events in this namespace are internal and never routed to streams.
    pub excluded_namespace: String,
}

impl AppenderConfig {
    /// Creates a configuration with the required paths and defaults for the
    /// rest.
    #[must_use]
    pub fn new(base_path: &Path, file_path: &str) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            file_path: file_path.to_string(),
            dir_permissions: None,
            file_permissions: None,
            max_inactive_ms: None,
            excluded_namespace: DEFAULT_EXCLUDED_NAMESPACE.to_string(),
        }
    }

    /// Sets the directory permission mode (octal or symbolic).
    #[must_use]
    pub fn with_dir_permissions(mut self, mode: &str) -> Self {
        self.dir_permissions = Some(mode.to_string());
        self
    }

    /// Sets the file permission mode (octal or symbolic).
    #[must_use]
    pub fn with_file_permissions(mut self, mode: &str) -> Self {
        self.file_permissions = Some(mode.to_string());
        self
    }

    /// Sets the idle threshold after which a stream is closed.
    #[must_use]
    pub fn with_max_inactive_ms(mut self, max_inactive_ms: i64) -> Self {
        self.max_inactive_ms = Some(max_inactive_ms);
        self
    }

    /// Overrides the excluded internal namespace.
    #[must_use]
    pub fn with_excluded_namespace(mut self, namespace: &str) -> Self {
        self.excluded_namespace = namespace.to_string();
        self
    }

    /// Validates the configuration, returning the parsed directory and file
    /// modes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required setting is absent or a mode
    /// string does not parse.
    pub fn validate(&self) -> Result<(FileMode, FileMode), ConfigError> {
        if self.base_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingBasePath);
        }
        if self.file_path.is_empty() {
            return Err(ConfigError::MissingFilePath);
        }
        let dir = self
            .dir_permissions
            .as_deref()
            .ok_or(ConfigError::MissingDirPermissions)?;
        let file = self
            .file_permissions
            .as_deref()
            .ok_or(ConfigError::MissingFilePermissions)?;
        let dir_mode = FileMode::parse(dir).map_err(ConfigError::BadMode)?;
        let file_mode = FileMode::parse(file).map_err(ConfigError::BadMode)?;
        Ok((dir_mode, file_mode))
    }

    /// Resolves the file path template for one program instance.
    ///
    /// The substitution happens once at startup; the resolved name is used
    /// verbatim for every stream afterwards.
    #[must_use]
    pub fn resolved_file_path(&self, instance_id: u32) -> String {
        self.file_path
            .replace(INSTANCE_ID_PLACEHOLDER, &instance_id.to_string())
    }
}
