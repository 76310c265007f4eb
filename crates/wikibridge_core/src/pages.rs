//! Single-page operations and store-wide listings.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};
use crate::graphql::WikiJsClient;
use crate::slug;
use crate::store::{PageDraft, PageKey, PageRecord, PageStore, PageSummary, PageUpdate};

#[derive(Debug, Clone, Default)]
pub struct CreatePageRequest {
    pub title: String,
    pub content: String,
    /// Defaults to the normalized title.
    pub path: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedPage {
    pub created: bool,
    pub page: PageRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub query: String,
    pub total: usize,
    pub results: Vec<PageSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Space {
    pub segment: String,
    pub title: String,
    pub root_page: Option<PageSummary>,
    pub page_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpacesReport {
    pub total_pages: usize,
    pub spaces: Vec<Space>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub authenticated: bool,
    pub api_url: String,
    pub auth_method: &'static str,
    pub status: &'static str,
    pub page_count: Option<usize>,
    pub error: Option<String>,
}

/// Create one page without touching its ancestors. An existing page at the target path is
/// returned unchanged.
pub fn create_page<S>(store: &mut S, request: &CreatePageRequest) -> BridgeResult<CreatedPage>
where
    S: PageStore + ?Sized,
{
    let path = match request.path.as_deref().map(slug::normalize_path).transpose()? {
        Some(path) if !path.is_empty() => path,
        _ => slug::normalize(&request.title)?,
    };

    if let Some(existing) = store
        .get_page(&PageKey::Path(path.clone()))
        .map_err(BridgeError::store)?
    {
        tracing::info!(path = %path, id = existing.id, "page already exists; not overwriting");
        return Ok(CreatedPage {
            created: false,
            page: existing,
        });
    }

    let mut draft =
        PageDraft::new(&path, &request.title, &request.content).with_parent(request.parent_id);
    if let Some(description) = &request.description {
        draft = draft.with_description(description);
    }
    let page = store.create_page(&draft).map_err(BridgeError::store)?;
    tracing::info!(path = %page.path, id = page.id, "created page");
    Ok(CreatedPage {
        created: true,
        page,
    })
}

pub fn get_page<S>(store: &mut S, key: &PageKey) -> BridgeResult<PageRecord>
where
    S: PageStore + ?Sized,
{
    store
        .get_page(key)
        .map_err(BridgeError::store)?
        .ok_or_else(|| BridgeError::not_found(key.to_string()))
}

/// Apply the given fields; unspecified fields keep their current values.
pub fn update_page<S>(store: &mut S, id: i64, update: &PageUpdate) -> BridgeResult<PageRecord>
where
    S: PageStore + ?Sized,
{
    if update.is_empty() {
        return Err(BridgeError::InvalidArgument {
            reason: "update names no fields (title, content or description)".to_string(),
        });
    }
    get_page(store, &PageKey::Id(id))?;
    let page = store.update_page(id, update).map_err(BridgeError::store)?;
    tracing::info!(id, path = %page.path, "updated page");
    Ok(page)
}

pub fn search_pages<S>(store: &mut S, query: &str, limit: Option<usize>) -> BridgeResult<SearchReport>
where
    S: PageStore + ?Sized,
{
    let mut results = store
        .search(query)
        .map_err(BridgeError::store)?
        .iter()
        .map(PageRecord::summary)
        .collect::<Vec<_>>();
    results.sort_by(|left, right| left.path.cmp(&right.path));
    let total = results.len();
    if let Some(limit) = limit {
        results.truncate(limit);
    }
    Ok(SearchReport {
        query: query.to_string(),
        total,
        results,
    })
}

/// Group every page by its top-level path segment.
pub fn list_spaces<S>(store: &mut S) -> BridgeResult<SpacesReport>
where
    S: PageStore + ?Sized,
{
    let pages = store.list_pages().map_err(BridgeError::store)?;
    let mut spaces: BTreeMap<String, Space> = BTreeMap::new();
    for page in &pages {
        let segment = page
            .path
            .split(slug::PATH_SEPARATOR)
            .find(|segment| !segment.is_empty())
            .unwrap_or_default()
            .to_string();
        if segment.is_empty() {
            continue;
        }
        let space = spaces.entry(segment.clone()).or_insert_with(|| Space {
            title: slug::title_from_segment(&segment),
            segment,
            root_page: None,
            page_count: 0,
        });
        space.page_count += 1;
        if slug::depth(&page.path) == 0 {
            space.title = page.title.clone();
            space.root_page = Some(page.summary());
        }
    }
    Ok(SpacesReport {
        total_pages: pages.len(),
        spaces: spaces.into_values().collect(),
    })
}

/// Authenticate and count pages. Failures are reported in the result, not returned.
pub fn connection_status(client: &mut WikiJsClient) -> ConnectionStatus {
    let api_url = client.settings().api_url.clone();
    let auth_method = client.settings().credentials.method();
    let outcome = client
        .ensure_authenticated()
        .and_then(|()| client.list_pages().map(|pages| pages.len()));
    status_from_outcome(api_url, auth_method, client.is_authenticated(), outcome)
}

fn status_from_outcome(
    api_url: String,
    auth_method: &'static str,
    authenticated: bool,
    outcome: Result<usize>,
) -> ConnectionStatus {
    match outcome {
        Ok(page_count) => ConnectionStatus {
            connected: true,
            authenticated,
            api_url,
            auth_method,
            status: "connected",
            page_count: Some(page_count),
            error: None,
        },
        Err(error) => {
            let message = format!("{error:#}");
            tracing::warn!(api_url = %api_url, error = %message, "Wiki.js connection check failed");
            ConnectionStatus {
                connected: false,
                authenticated,
                api_url,
                auth_method,
                status: "error",
                page_count: None,
                error: Some(message),
            }
        }
    }
}
