//! Notebooks, pages and folders
//!
//! The hierarchy mirrors the note app: folders nest, notebooks live in a
//! folder (or at the root) and own an ordered list of page ids. A page
//! without a notebook is a standalone "quick page".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Template used for pages created without an explicit background
pub const DEFAULT_NATIVE_TEMPLATE: &str = "blank";

/// Background type for the built-in templates
pub const NATIVE_BACKGROUND_TYPE: &str = "native";

// ============================================================================
// Folder
// ============================================================================

/// A folder in the library tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub title: String,
    pub parent_folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            parent_folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Notebook
// ============================================================================

/// A notebook and the order of its pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: String,
    pub title: String,
    pub parent_folder_id: Option<String>,
    pub default_native_template: String,
    /// Page ids in display order
    pub page_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notebook {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            parent_folder_id: None,
            default_native_template: DEFAULT_NATIVE_TEMPLATE.to_string(),
            page_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Position of `page_id` in this notebook, if it belongs here
    pub fn page_index(&self, page_id: &str) -> Option<usize> {
        self.page_ids.iter().position(|id| id == page_id)
    }

    pub fn contains_page(&self, page_id: &str) -> bool {
        self.page_index(page_id).is_some()
    }
}

// ============================================================================
// Page
// ============================================================================

/// A single page of handwriting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    /// Owning notebook; `None` for standalone pages
    pub notebook_id: Option<String>,
    pub scroll: i32,
    pub background: String,
    pub background_type: String,
    /// Folder of a standalone page
    pub parent_folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(id: impl Into<String>, notebook_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            notebook_id,
            scroll: 0,
            background: DEFAULT_NATIVE_TEMPLATE.to_string(),
            background_type: NATIVE_BACKGROUND_TYPE.to_string(),
            parent_folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.notebook_id.is_none()
    }

    /// Field-by-field comparison at the second precision the wire format keeps
    pub fn same_content(&self, other: &Page) -> bool {
        self.id == other.id
            && self.notebook_id == other.notebook_id
            && self.scroll == other.scroll
            && self.background == other.background
            && self.background_type == other.background_type
            && self.parent_folder_id == other.parent_folder_id
            && self.created_at.timestamp() == other.created_at.timestamp()
            && self.updated_at.timestamp() == other.updated_at.timestamp()
    }
}
