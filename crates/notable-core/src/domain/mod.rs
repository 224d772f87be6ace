//! Domain entities and sync policies
//!
//! This module contains the core domain types for Notable sync:
//! - Note entities moved between devices (notebooks, pages, strokes, images, folders)
//! - Queue entries with their backoff ladder
//! - Deletion tombstones
//! - The result vocabulary returned by sync operations
//! - Remote file naming

pub mod deletion;
pub mod errors;
pub mod image;
pub mod newtypes;
pub mod notebook;
pub mod outcome;
pub mod queue;
pub mod stroke;
pub mod sync_file;

// Re-export commonly used types
pub use deletion::{DeletionLogEntry, DeletionType, DELETION_RETENTION_DAYS};
pub use errors::DomainError;
pub use image::{file_name_of, mime_type_for, Image};
pub use newtypes::*;
pub use notebook::{Folder, Notebook, Page, DEFAULT_NATIVE_TEMPLATE, NATIVE_BACKGROUND_TYPE};
pub use outcome::SyncOutcome;
pub use queue::{
    backoff_delay, QueueStatus, SyncOperation, SyncQueueEntry, SyncTargetType,
    DEFAULT_MAX_RETRIES,
};
pub use stroke::{Pen, Stroke, StrokePoint};
pub use sync_file::{parse_file_name, SyncFileInfo, SyncFileType};
