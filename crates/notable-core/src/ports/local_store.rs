//! Local note store port (driven/secondary port)
//!
//! The sync core never touches the note database directly; it reads and
//! writes entities through this narrow interface.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Each single-entity write is expected to be atomic. Sequences of writes
//!   across one sync pass are not transactional.
//! - The bulk `delete_all_*` methods exist only for the destructive
//!   replace-local path.

use chrono::{DateTime, Utc};

use crate::domain::{Folder, Image, Notebook, Page, Stroke};

#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    // --- Reads ---

    async fn get_all_notebooks(&self) -> anyhow::Result<Vec<Notebook>>;

    async fn get_notebook_by_id(&self, id: &str) -> anyhow::Result<Option<Notebook>>;

    async fn get_page_by_id(&self, id: &str) -> anyhow::Result<Option<Page>>;

    /// Every page, including standalone ones
    async fn get_all_pages(&self) -> anyhow::Result<Vec<Page>>;

    async fn get_strokes_by_page_id(&self, page_id: &str) -> anyhow::Result<Vec<Stroke>>;

    async fn get_images_by_page_id(&self, page_id: &str) -> anyhow::Result<Vec<Image>>;

    async fn get_folder_by_id(&self, id: &str) -> anyhow::Result<Option<Folder>>;

    /// Pages whose `updated_at` is strictly after `since`
    async fn get_pages_modified_after(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<Page>>;

    /// Notebooks whose `updated_at` is strictly after `since`
    async fn get_notebooks_modified_after(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Notebook>>;

    // --- Writes ---

    async fn insert_notebook(&self, notebook: &Notebook) -> anyhow::Result<()>;

    async fn update_notebook(&self, notebook: &Notebook) -> anyhow::Result<()>;

    /// Insert the page or replace the stored row with the same id
    async fn upsert_page(&self, page: &Page) -> anyhow::Result<()>;

    async fn insert_stroke(&self, stroke: &Stroke) -> anyhow::Result<()>;

    async fn insert_image(&self, image: &Image) -> anyhow::Result<()>;

    async fn delete_strokes_by_page_id(&self, page_id: &str) -> anyhow::Result<()>;

    async fn delete_images_by_page_id(&self, page_id: &str) -> anyhow::Result<()>;

    /// Remove a notebook with its pages and their children
    async fn delete_notebook(&self, id: &str) -> anyhow::Result<()>;

    /// Remove a page with its strokes and images
    async fn delete_page(&self, id: &str) -> anyhow::Result<()>;

    // --- Bulk deletes (replace-local only) ---

    async fn delete_all_strokes(&self) -> anyhow::Result<()>;

    async fn delete_all_images(&self) -> anyhow::Result<()>;

    async fn delete_all_pages(&self) -> anyhow::Result<()>;

    async fn delete_all_notebooks(&self) -> anyhow::Result<()>;

    async fn delete_all_folders(&self) -> anyhow::Result<()>;
}
