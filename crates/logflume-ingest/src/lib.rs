//! # logflume Ingest
//!
//! Log ingestion core: routes structured log events to per-stream durable
//! files with policy-driven rollover, and records per-partition read offsets
//! so a downstream processor can resume without loss or duplication.
//!
//! This crate provides:
//! - **Events**: [`LogEvent`] with context tags, and [`StreamIdentity`]
//!   derivation, pure over tags so producer threads agree without shared
//!   state
//! - **Routing**: [`RollingAppender`], the per-event state machine over a
//!   [`LocationManager`] that owns every open stream
//! - **Policies**: pluggable [`TriggeringPolicy`] / [`RollingPolicy`]
//!   variants wired together through a release callback
//! - **Checkpoints**: [`CheckpointManager`] persisting [`Checkpoint`]s
//!   through a transactional partitioned store, with change suppression
//!
//! The appender executes synchronously on the producing thread; there is no
//! internal queue or worker. Recoverable per-event failures are logged and
//! reported through [`AppendOutcome`]; logging must not crash the host
//! application. Checkpoint failures, by contrast, propagate: silently losing
//! progress tracking risks duplicate reprocessing.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// The rolling appender and its per-event state machine.
pub mod appender;

/// Checkpoint values and the checkpoint manager.
pub mod checkpoint;

/// Appender configuration and startup validation.
pub mod config;

/// Structured log events and context tags.
pub mod event;

/// Stream identity derivation.
pub mod identity;

/// Ownership of the currently open streams.
pub mod manager;

/// Triggering and rolling policies.
pub mod policy;

/// Managed append streams.
pub mod stream;

#[cfg(test)]
mod testutil;

pub use appender::{AppendError, AppendOutcome, RollingAppender};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointManager};
pub use config::{AppenderConfig, ConfigError, INSTANCE_ID_PLACEHOLDER};
pub use event::LogEvent;
pub use identity::{IdentityError, StreamIdentity};
pub use manager::{LocationManager, StreamHandle};
pub use policy::{
    AgeTriggeringPolicy, CompositeTriggeringPolicy, FixedWindowRollingPolicy, RollingPolicy,
    RolloverError, SizeTriggeringPolicy, TriggeringPolicy,
};
pub use stream::{ManagedStream, StreamStats};
