//! Structured log events and their context tags.

use std::collections::BTreeMap;

/// Tag naming the namespace an event belongs to.
pub const TAG_NAMESPACE: &str = "namespace";

/// Tag naming the application an event belongs to.
pub const TAG_APPLICATION: &str = "application";

/// Tag naming the program within the application.
pub const TAG_PROGRAM: &str = "program";

/// Tag naming the run of the program.
pub const TAG_RUN: &str = "run";

/// Tag naming the program instance; never part of stream identity. The
/// instance id is substituted into the file path template once at startup.
pub const TAG_INSTANCE: &str = "instance";

/// An immutable structured log event.
///
/// Carries a millisecond timestamp, a set of context tags and an opaque,
/// already-encoded payload. The ingestion core never inspects the payload;
/// formatting belongs to the producing side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    timestamp_ms: i64,
    tags: BTreeMap<String, String>,
    payload: Vec<u8>,
}

impl LogEvent {
    /// Creates an event with no tags.
    #[must_use]
    pub fn new(timestamp_ms: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp_ms,
            tags: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Adds a context tag, replacing any previous value for the same name.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Event time in milliseconds since the epoch.
    #[must_use]
    pub const fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Looks up one tag value.
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// All context tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// The opaque payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_replace_on_same_name() {
        let event = LogEvent::new(1, "x")
            .with_tag(TAG_NAMESPACE, "default")
            .with_tag(TAG_NAMESPACE, "prod");
        assert_eq!(event.tag(TAG_NAMESPACE), Some("prod"));
        assert_eq!(event.tags().len(), 1);
    }

    #[test]
    fn test_payload_and_timestamp() {
        let event = LogEvent::new(42, vec![1, 2, 3]);
        assert_eq!(event.timestamp_ms(), 42);
        assert_eq!(event.payload(), &[1, 2, 3]);
        assert_eq!(event.tag(TAG_RUN), None);
    }
}
