//! SQLite implementation of ILocalStore
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                                  |
//! |----------------------|----------|-------------------------------------------|
//! | entity ids           | TEXT     | as produced by the note app               |
//! | DateTime<Utc>        | TEXT     | fixed-width RFC 3339, microseconds, `Z`   |
//! | Notebook::page_ids   | TEXT     | serde_json array, order preserved         |
//! | Stroke::points       | TEXT     | serde_json array of points                |
//! | Pen                  | TEXT     | wire name (`BALLPEN`, `PENCIL`...)        |

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use notable_core::domain::{Folder, Image, Notebook, Page, Pen, Stroke, StrokePoint};
use notable_core::ports::ILocalStore;

use crate::codec::{format_datetime, parse_datetime};
use crate::CacheError;

/// Note store backed by the shared SQLite pool
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Folders are created by the note app; this exists for seeding and tests
    pub async fn insert_folder(&self, folder: &Folder) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO folders (id, title, parent_folder_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&folder.id)
        .bind(&folder.title)
        .bind(&folder.parent_folder_id)
        .bind(format_datetime(&folder.created_at))
        .bind(format_datetime(&folder.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_notebook(&self, notebook: &Notebook) -> Result<(), CacheError> {
        let page_ids = serde_json::to_string(&notebook.page_ids)?;
        sqlx::query(
            "INSERT OR REPLACE INTO notebooks
                (id, title, parent_folder_id, default_native_template, page_ids, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notebook.id)
        .bind(&notebook.title)
        .bind(&notebook.parent_folder_id)
        .bind(&notebook.default_native_template)
        .bind(page_ids)
        .bind(format_datetime(&notebook.created_at))
        .bind(format_datetime(&notebook.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn folder_from_row(row: &SqliteRow) -> Result<Folder, CacheError> {
    Ok(Folder {
        id: row.get("id"),
        title: row.get("title"),
        parent_folder_id: row.get("parent_folder_id"),
        created_at: parse_datetime(row.get("created_at"))?,
        updated_at: parse_datetime(row.get("updated_at"))?,
    })
}

fn notebook_from_row(row: &SqliteRow) -> Result<Notebook, CacheError> {
    let page_ids: String = row.get("page_ids");
    Ok(Notebook {
        id: row.get("id"),
        title: row.get("title"),
        parent_folder_id: row.get("parent_folder_id"),
        default_native_template: row.get("default_native_template"),
        page_ids: serde_json::from_str(&page_ids)?,
        created_at: parse_datetime(row.get("created_at"))?,
        updated_at: parse_datetime(row.get("updated_at"))?,
    })
}

fn page_from_row(row: &SqliteRow) -> Result<Page, CacheError> {
    Ok(Page {
        id: row.get("id"),
        notebook_id: row.get("notebook_id"),
        scroll: row.get("scroll"),
        background: row.get("background"),
        background_type: row.get("background_type"),
        parent_folder_id: row.get("parent_folder_id"),
        created_at: parse_datetime(row.get("created_at"))?,
        updated_at: parse_datetime(row.get("updated_at"))?,
    })
}

fn stroke_from_row(row: &SqliteRow) -> Result<Stroke, CacheError> {
    let pen: String = row.get("pen");
    let points: String = row.get("points");
    let points: Vec<StrokePoint> = serde_json::from_str(&points)?;
    Ok(Stroke {
        id: row.get("id"),
        page_id: row.get("page_id"),
        size: row.get::<f64, _>("size") as f32,
        pen: pen
            .parse::<Pen>()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        color: row.get("color"),
        top: row.get::<f64, _>("bbox_top") as f32,
        bottom: row.get::<f64, _>("bbox_bottom") as f32,
        left: row.get::<f64, _>("bbox_left") as f32,
        right: row.get::<f64, _>("bbox_right") as f32,
        points,
        created_at: parse_datetime(row.get("created_at"))?,
        updated_at: parse_datetime(row.get("updated_at"))?,
    })
}

fn image_from_row(row: &SqliteRow) -> Result<Image, CacheError> {
    Ok(Image {
        id: row.get("id"),
        page_id: row.get("page_id"),
        x: row.get("x"),
        y: row.get("y"),
        width: row.get("width"),
        height: row.get("height"),
        uri: row.get("uri"),
        created_at: parse_datetime(row.get("created_at"))?,
        updated_at: parse_datetime(row.get("updated_at"))?,
    })
}

fn collect<T>(
    rows: &[SqliteRow],
    map: fn(&SqliteRow) -> Result<T, CacheError>,
) -> anyhow::Result<Vec<T>> {
    Ok(rows.iter().map(map).collect::<Result<Vec<_>, _>>()?)
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteLocalStore {
    async fn get_all_notebooks(&self) -> anyhow::Result<Vec<Notebook>> {
        let rows = sqlx::query("SELECT * FROM notebooks ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, notebook_from_row)
    }

    async fn get_notebook_by_id(&self, id: &str) -> anyhow::Result<Option<Notebook>> {
        let row = sqlx::query("SELECT * FROM notebooks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(notebook_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_page_by_id(&self, id: &str) -> anyhow::Result<Option<Page>> {
        let row = sqlx::query("SELECT * FROM pages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(page_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_all_pages(&self) -> anyhow::Result<Vec<Page>> {
        let rows = sqlx::query("SELECT * FROM pages ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, page_from_row)
    }

    async fn get_strokes_by_page_id(&self, page_id: &str) -> anyhow::Result<Vec<Stroke>> {
        let rows = sqlx::query("SELECT * FROM strokes WHERE page_id = ? ORDER BY created_at ASC")
            .bind(page_id)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, stroke_from_row)
    }

    async fn get_images_by_page_id(&self, page_id: &str) -> anyhow::Result<Vec<Image>> {
        let rows = sqlx::query("SELECT * FROM images WHERE page_id = ? ORDER BY created_at ASC")
            .bind(page_id)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, image_from_row)
    }

    async fn get_folder_by_id(&self, id: &str) -> anyhow::Result<Option<Folder>> {
        let row = sqlx::query("SELECT * FROM folders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(folder_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_pages_modified_after(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<Page>> {
        let rows = sqlx::query("SELECT * FROM pages WHERE updated_at > ? ORDER BY updated_at ASC")
            .bind(format_datetime(&since))
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, page_from_row)
    }

    async fn get_notebooks_modified_after(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Notebook>> {
        let rows =
            sqlx::query("SELECT * FROM notebooks WHERE updated_at > ? ORDER BY updated_at ASC")
                .bind(format_datetime(&since))
                .fetch_all(&self.pool)
                .await?;
        collect(&rows, notebook_from_row)
    }

    async fn insert_notebook(&self, notebook: &Notebook) -> anyhow::Result<()> {
        self.write_notebook(notebook).await?;
        tracing::trace!(notebook_id = %notebook.id, "Notebook inserted");
        Ok(())
    }

    async fn update_notebook(&self, notebook: &Notebook) -> anyhow::Result<()> {
        self.write_notebook(notebook).await?;
        tracing::trace!(notebook_id = %notebook.id, "Notebook updated");
        Ok(())
    }

    async fn upsert_page(&self, page: &Page) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO pages
                (id, notebook_id, scroll, background, background_type, parent_folder_id,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&page.id)
        .bind(&page.notebook_id)
        .bind(page.scroll)
        .bind(&page.background)
        .bind(&page.background_type)
        .bind(&page.parent_folder_id)
        .bind(format_datetime(&page.created_at))
        .bind(format_datetime(&page.updated_at))
        .execute(&self.pool)
        .await?;

        tracing::trace!(page_id = %page.id, "Page upserted");
        Ok(())
    }

    async fn insert_stroke(&self, stroke: &Stroke) -> anyhow::Result<()> {
        let points = serde_json::to_string(&stroke.points)
            .map_err(|e| anyhow::anyhow!("Failed to serialize stroke points: {}", e))?;
        sqlx::query(
            "INSERT OR REPLACE INTO strokes
                (id, page_id, size, pen, color, bbox_top, bbox_bottom, bbox_left, bbox_right,
                 points, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stroke.id)
        .bind(&stroke.page_id)
        .bind(f64::from(stroke.size))
        .bind(stroke.pen.name())
        .bind(stroke.color)
        .bind(f64::from(stroke.top))
        .bind(f64::from(stroke.bottom))
        .bind(f64::from(stroke.left))
        .bind(f64::from(stroke.right))
        .bind(points)
        .bind(format_datetime(&stroke.created_at))
        .bind(format_datetime(&stroke.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_image(&self, image: &Image) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO images
                (id, page_id, x, y, width, height, uri, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&image.id)
        .bind(&image.page_id)
        .bind(image.x)
        .bind(image.y)
        .bind(image.width)
        .bind(image.height)
        .bind(&image.uri)
        .bind(format_datetime(&image.created_at))
        .bind(format_datetime(&image.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_strokes_by_page_id(&self, page_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM strokes WHERE page_id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_images_by_page_id(&self, page_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM images WHERE page_id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_notebook(&self, id: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for sql in [
            "DELETE FROM strokes WHERE page_id IN (SELECT id FROM pages WHERE notebook_id = ?)",
            "DELETE FROM images WHERE page_id IN (SELECT id FROM pages WHERE notebook_id = ?)",
            "DELETE FROM pages WHERE notebook_id = ?",
            "DELETE FROM notebooks WHERE id = ?",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(notebook_id = %id, "Notebook deleted locally");
        Ok(())
    }

    async fn delete_page(&self, id: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<(String, String)> = sqlx::query_as(
            "SELECT n.id, n.page_ids FROM notebooks n
             JOIN pages p ON p.notebook_id = n.id WHERE p.id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((notebook_id, page_ids)) = owner {
            let mut page_ids: Vec<String> = serde_json::from_str(&page_ids)
                .map_err(|e| CacheError::SerializationError(e.to_string()))?;
            page_ids.retain(|p| p != id);
            sqlx::query("UPDATE notebooks SET page_ids = ? WHERE id = ?")
                .bind(serde_json::to_string(&page_ids)?)
                .bind(&notebook_id)
                .execute(&mut *tx)
                .await?;
        }

        for sql in [
            "DELETE FROM strokes WHERE page_id = ?",
            "DELETE FROM images WHERE page_id = ?",
            "DELETE FROM pages WHERE id = ?",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(page_id = %id, "Page deleted locally");
        Ok(())
    }

    async fn delete_all_strokes(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM strokes").execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_all_images(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM images").execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_all_pages(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM pages").execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_all_notebooks(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM notebooks").execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_all_folders(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM folders").execute(&self.pool).await?;
        Ok(())
    }
}
