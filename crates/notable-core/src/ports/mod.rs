//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The sync core depends on these interfaces; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILocalStore`] - The device's note database
//! - [`IRemoteStore`] - The shared remote file tree (WebDAV)
//! - [`ISyncQueueRepository`] - Durable retry queue
//! - [`IDeletionLogRepository`] - Deletion tombstones
//! - [`IWatermarkStore`] - Last completed sync cycle
//! - [`IImageStore`] - Local image bytes

pub mod deletion_log;
pub mod image_store;
pub mod local_store;
pub mod remote_store;
pub mod sync_queue;
pub mod watermark;

pub use deletion_log::IDeletionLogRepository;
pub use image_store::IImageStore;
pub use local_store::ILocalStore;
pub use remote_store::{IRemoteStore, WebDavFileInfo, BINARY_CONTENT_TYPE, JSON_CONTENT_TYPE};
pub use sync_queue::ISyncQueueRepository;
pub use watermark::IWatermarkStore;
