use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::slug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub id: i64,
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(default)]
    pub locale: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

fn default_published() -> bool {
    true
}

impl PageRecord {
    pub fn parent_path(&self) -> &str {
        slug::parent_path(&self.path)
    }

    pub fn summary(&self) -> PageSummary {
        PageSummary {
            id: self.id,
            title: self.title.clone(),
            path: self.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub id: i64,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKey {
    Id(i64),
    Path(String),
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "page id {id}"),
            Self::Path(path) => write!(f, "page path {path:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDraft {
    pub path: String,
    pub title: String,
    pub content: String,
    pub description: String,
    pub parent_id: Option<i64>,
}

impl PageDraft {
    pub fn new(path: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            path: path.into(),
            description: title.clone(),
            title,
            content: content.into(),
            parent_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
}

impl PageUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.description.is_none()
    }
}

/// Capability the hierarchy operations depend on. Errors are transport failures; an absent
/// page is `Ok(None)`.
pub trait PageStore {
    fn create_page(&mut self, draft: &PageDraft) -> Result<PageRecord>;
    fn get_page(&mut self, key: &PageKey) -> Result<Option<PageRecord>>;
    fn list_children(&mut self, path: &str) -> Result<Vec<PageRecord>>;
    fn list_pages(&mut self) -> Result<Vec<PageRecord>>;
    fn update_page(&mut self, id: i64, update: &PageUpdate) -> Result<PageRecord>;
    fn delete_page(&mut self, id: i64) -> Result<()>;
    fn search(&mut self, query: &str) -> Result<Vec<PageRecord>>;
}
