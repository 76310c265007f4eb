use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};

use crate::slug;
use crate::store::{PageDraft, PageKey, PageRecord, PageStore, PageUpdate};

/// In-memory page store with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub pages: BTreeMap<i64, PageRecord>,
    pub parent_ids: BTreeMap<i64, Option<i64>>,
    pub next_id: i64,
    pub created_paths: Vec<String>,
    pub deleted_ids: Vec<i64>,
    /// `create_page` fails for these paths.
    pub fail_create_paths: BTreeSet<String>,
    /// `create_page` fails for these paths but the page appears anyway, as if a concurrent
    /// writer created it first.
    pub race_create_paths: BTreeSet<String>,
    pub fail_delete_ids: BTreeSet<i64>,
    pub fail_get_ids: BTreeSet<i64>,
    pub unavailable: bool,
    pub requests: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    pub fn with_paths(paths: &[&str]) -> Self {
        let mut store = Self::new();
        for path in paths {
            store.insert(path, &slug::title_from_segment(slug::last_segment(path)));
        }
        store
    }

    pub fn insert(&mut self, path: &str, title: &str) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pages.insert(
            id,
            PageRecord {
                id,
                path: path.to_string(),
                title: title.to_string(),
                description: title.to_string(),
                content: format!("# {title}"),
                is_published: true,
                locale: "en".to_string(),
                created_at: Some("2026-01-01T00:00:00Z".to_string()),
                updated_at: Some("2026-01-01T00:00:00Z".to_string()),
            },
        );
        id
    }

    pub fn id_of(&self, path: &str) -> Option<i64> {
        self.pages
            .values()
            .find(|page| page.path == path)
            .map(|page| page.id)
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.id_of(path).is_some()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn touch(&mut self) -> Result<()> {
        self.requests += 1;
        if self.unavailable {
            bail!("connection refused");
        }
        Ok(())
    }
}

impl PageStore for MemoryStore {
    fn create_page(&mut self, draft: &PageDraft) -> Result<PageRecord> {
        self.touch()?;
        if self.race_create_paths.remove(&draft.path) {
            self.insert(&draft.path, &draft.title);
            bail!("page already exists at path {}", draft.path);
        }
        if self.fail_create_paths.contains(&draft.path) {
            bail!("create rejected for {}", draft.path);
        }
        if self.has_path(&draft.path) {
            bail!("page already exists at path {}", draft.path);
        }
        let id = self.insert(&draft.path, &draft.title);
        self.parent_ids.insert(id, draft.parent_id);
        self.created_paths.push(draft.path.clone());
        let page = self
            .pages
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("inserted page vanished"))?;
        page.content = draft.content.clone();
        page.description = draft.description.clone();
        Ok(page.clone())
    }

    fn get_page(&mut self, key: &PageKey) -> Result<Option<PageRecord>> {
        self.touch()?;
        match key {
            PageKey::Id(id) => {
                if self.fail_get_ids.contains(id) {
                    bail!("timeout fetching page {id}");
                }
                Ok(self.pages.get(id).cloned())
            }
            PageKey::Path(path) => Ok(self
                .pages
                .values()
                .find(|page| &page.path == path)
                .cloned()),
        }
    }

    fn list_children(&mut self, path: &str) -> Result<Vec<PageRecord>> {
        self.touch()?;
        Ok(self
            .pages
            .values()
            .filter(|page| slug::is_direct_child(path, &page.path))
            .cloned()
            .collect())
    }

    fn list_pages(&mut self) -> Result<Vec<PageRecord>> {
        self.touch()?;
        Ok(self.pages.values().cloned().collect())
    }

    fn update_page(&mut self, id: i64, update: &PageUpdate) -> Result<PageRecord> {
        self.touch()?;
        let page = self
            .pages
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("page {id} does not exist"))?;
        if let Some(title) = &update.title {
            page.title = title.clone();
        }
        if let Some(content) = &update.content {
            page.content = content.clone();
        }
        if let Some(description) = &update.description {
            page.description = description.clone();
        }
        page.updated_at = Some("2026-01-02T00:00:00Z".to_string());
        Ok(page.clone())
    }

    fn delete_page(&mut self, id: i64) -> Result<()> {
        self.touch()?;
        if self.fail_delete_ids.contains(&id) {
            bail!("delete rejected for page {id}");
        }
        if self.pages.remove(&id).is_none() {
            bail!("page {id} does not exist");
        }
        self.deleted_ids.push(id);
        Ok(())
    }

    fn search(&mut self, query: &str) -> Result<Vec<PageRecord>> {
        self.touch()?;
        let needle = query.to_lowercase();
        Ok(self
            .pages
            .values()
            .filter(|page| {
                query == "*"
                    || page.title.to_lowercase().contains(&needle)
                    || page.path.to_lowercase().contains(&needle)
                    || page.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}
