//! Sync watermark port
//!
//! The watermark is owned by the orchestrator and read or written only
//! through this interface, so tests can substitute an in-memory value.

use crate::domain::SyncWatermark;

#[async_trait::async_trait]
pub trait IWatermarkStore: Send + Sync {
    /// Current watermark; [`SyncWatermark::ZERO`] when never synced
    async fn get(&self) -> anyhow::Result<SyncWatermark>;

    async fn set(&self, watermark: SyncWatermark) -> anyhow::Result<()>;
}
