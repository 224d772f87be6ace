//! Notable Cache - Local persistence for the sync engine
//!
//! SQLite-backed adapters for:
//! - Folders, notebooks, pages, strokes and images
//! - The durable sync queue
//! - The deletion log (tombstones)
//! - Small key/value sync state (watermark, device id)
//!
//! ## Architecture
//!
//! Each store implements one port from `notable-core` and shares a single
//! [`DatabasePool`]. They are driven (secondary) adapters in the hexagonal
//! architecture.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use notable_cache::{DatabasePool, SqliteLocalStore, SqliteSyncQueueRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/notable-sync/notable.db")).await?;
//! let notes = SqliteLocalStore::new(pool.pool().clone());
//! let queue = SqliteSyncQueueRepository::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

mod codec;
pub mod deletion_log;
pub mod local_store;
pub mod pool;
pub mod queue;
pub mod sync_state;

pub use deletion_log::SqliteDeletionLogRepository;
pub use local_store::SqliteLocalStore;
pub use pool::DatabasePool;
pub use queue::SqliteSyncQueueRepository;
pub use sync_state::SqliteSyncStateStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded into a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
