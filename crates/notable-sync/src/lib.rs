//! Notable Sync - Offline-first bidirectional synchronization
//!
//! Provides:
//! - The versioned JSON envelope exchanged between devices
//! - A durable retry queue and deletion tombstones
//! - Push, pull and bidirectional sync against a remote file store
//! - A periodic scheduler that drains the queue when connectivity returns
//!
//! ## Modules
//!
//! - [`serializer`] - Wire structs and domain conversion
//! - [`queue`] - Retry queue over the persistence port
//! - [`deletions`] - Tombstone bookkeeping
//! - [`sync_log`] - Rolling user-facing event log
//! - [`orchestrator`] - Push/pull/bidirectional cycles
//! - [`filesystem`] - Local image files
//! - [`scheduler`] - Background loop

pub mod deletions;
pub mod filesystem;
pub mod orchestrator;
pub mod queue;
pub mod scheduler;
pub mod serializer;
pub mod sync_log;

pub use deletions::DeletionLog;
pub use filesystem::FsImageStore;
pub use orchestrator::{SyncOrchestrator, SyncPorts};
pub use queue::SyncQueue;
pub use scheduler::SyncScheduler;
pub use serializer::SyncSerializer;
pub use sync_log::{LogLevel, SyncLog, SyncLogEntry};

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while encoding, decoding or storing sync payloads
#[derive(Debug, Error)]
pub enum SyncError {
    /// Envelope JSON could not be produced or parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A wire timestamp did not match the expected format
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A domain-level error propagated from notable-core
    #[error("Domain error: {0}")]
    Domain(#[from] notable_core::domain::DomainError),

    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An image file name that would escape the image directory
    #[error("Invalid image file name: {0}")]
    InvalidFileName(String),

    /// A URI that does not point at a local file
    #[error("Unsupported image URI: {0}")]
    UnsupportedUri(String),

    /// A queued operation is missing the data it needs to run
    #[error("Queue entry {0} has no payload")]
    MissingPayload(String),

    /// The image directory could not be created
    #[error("Image directory unavailable: {0}")]
    ImageDirUnavailable(PathBuf),
}
