//! # logflume Storage
//!
//! Collaborator contracts for the logflume ingestion core, plus the concrete
//! backends shipped with it.
//!
//! This crate provides:
//! - **Locations**: the [`Storage`] / [`AppendStream`] durable-file
//!   abstraction (create with permission modes, append, rename, delete) and
//!   the [`LocalStorage`] filesystem implementation
//! - **Tables**: the [`TransactionRunner`] / [`CheckpointTable`] transactional
//!   partitioned row store abstraction, with an in-memory backend
//!   ([`MemoryTableStore`]) and a single-file JSON backend ([`FsTableStore`])
//!
//! The ingestion core only depends on the traits; which backend is wired in
//! is a deployment decision.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Single-file JSON table store with atomic rename commits.
pub mod fs;

/// Local filesystem storage backend.
pub mod local;

/// Durable file location contracts and permission modes.
pub mod location;

/// In-memory table store for tests and ephemeral deployments.
pub mod memory;

/// Transactional partitioned row store contracts.
pub mod table;

pub use fs::FsTableStore;
pub use local::LocalStorage;
pub use location::{AppendStream, FileMode, Storage, StorageError};
pub use memory::MemoryTableStore;
pub use table::{CheckpointRow, CheckpointTable, RowKey, StagedTable, TableError, TransactionRunner};
