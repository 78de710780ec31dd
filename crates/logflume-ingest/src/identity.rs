//! Stream identity derivation from event context tags.

use std::fmt;
use std::path::PathBuf;

use crate::event::{LogEvent, TAG_APPLICATION, TAG_NAMESPACE};

/// Errors from identity derivation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// A tag required for identity derivation is absent.
    #[error("event carries no {0} tag")]
    MissingTag(&'static str),
}

/// Derived key identifying one logical log destination.
///
/// Computed purely from an event's context tags, so concurrent producer
/// threads arrive at the same key without shared state. The relevant tags
/// are `namespace` and `application`; `program`, `run` and `instance` vary
/// within one destination and are deliberately excluded (`instance` is
/// resolved once at startup through the file path template instead).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentity {
    namespace: String,
    application: String,
}

impl StreamIdentity {
    /// Builds an identity directly from its parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            application: application.into(),
        }
    }

    /// Derives the identity for `event` from its context tags.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MissingTag`] if the namespace or application
    /// tag is absent; such events have no routable destination.
    pub fn resolve(event: &LogEvent) -> Result<Self, IdentityError> {
        let namespace = event
            .tag(TAG_NAMESPACE)
            .ok_or(IdentityError::MissingTag(TAG_NAMESPACE))?;
        let application = event
            .tag(TAG_APPLICATION)
            .ok_or(IdentityError::MissingTag(TAG_APPLICATION))?;
        Ok(Self::new(namespace, application))
    }

    /// The namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The application component.
    #[must_use]
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Directory for this identity, relative to the configured base path.
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.namespace).join(&self.application)
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.application)
    }
}
