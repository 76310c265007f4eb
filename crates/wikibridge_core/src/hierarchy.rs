//! Hierarchical page creation.
//!
//! Every operation here walks paths root-to-leaf and creates missing pages one at a time.
//! Existing pages are never modified.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::ledger::MappingLedger;
use crate::mapping::{self, DEFAULT_RELATIONSHIP};
use crate::report::ReportStatus;
use crate::runtime::normalize_for_display;
use crate::slug;
use crate::store::{PageDraft, PageKey, PageRecord, PageStore, PageSummary};

pub const DEFAULT_SECTIONS: &[&str] = &["Overview", "API", "Components", "Deployment"];
const FALLBACK_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Default)]
pub struct EnsurePathRequest {
    /// Raw `/`-separated path; each segment is normalized. Empty means a root-level page
    /// named after `leaf_title`.
    pub full_path: String,
    pub leaf_title: String,
    pub leaf_content: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsuredPath {
    pub leaf: PageRecord,
    pub leaf_created: bool,
    pub created_ancestors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NestedPageRequest {
    pub title: String,
    pub content: String,
    pub parent_path: String,
    pub create_parents: bool,
}

#[derive(Debug, Clone)]
pub struct StructureRequest {
    pub root_title: String,
    pub description: String,
    /// Empty selects [`DEFAULT_SECTIONS`].
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionOutcome {
    pub title: String,
    pub path: Option<String>,
    pub page: Option<PageSummary>,
    pub created: bool,
    pub created_ancestors: Vec<String>,
    pub error: Option<String>,
}

impl SectionOutcome {
    fn from_result(title: &str, path: Option<String>, result: BridgeResult<EnsuredPath>) -> Self {
        match result {
            Ok(ensured) => Self {
                title: title.to_string(),
                path: Some(ensured.leaf.path.clone()),
                page: Some(ensured.leaf.summary()),
                created: ensured.leaf_created,
                created_ancestors: ensured.created_ancestors,
                error: None,
            },
            Err(error) => {
                tracing::warn!(section = title, error = %error, "section creation failed");
                Self {
                    title: title.to_string(),
                    path,
                    page: None,
                    created: false,
                    created_ancestors: Vec::new(),
                    error: Some(error.to_string()),
                }
            }
        }
    }

    fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureReport {
    pub root: PageSummary,
    pub root_created: bool,
    pub sections: Vec<SectionOutcome>,
    pub created_count: usize,
    pub failed_count: usize,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DocFileSpec {
    pub file_path: String,
    /// Path of the page under its category. Defaults to the file stem.
    #[serde(default)]
    pub doc_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocsHierarchyRequest {
    pub project_name: String,
    pub files: Vec<DocFileSpec>,
    pub repository_root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocFileOutcome {
    pub file_path: String,
    pub category: String,
    pub page: Option<PageSummary>,
    pub created: bool,
    pub linked: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocsHierarchyReport {
    pub project: PageSummary,
    pub categories: Vec<SectionOutcome>,
    pub files: Vec<DocFileOutcome>,
    pub created_pages: usize,
    pub failed_count: usize,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildrenReport {
    pub parent_path: String,
    pub parent: Option<PageSummary>,
    pub children: Vec<PageSummary>,
    pub total_children: usize,
}

/// Ensure every ancestor of the target path exists, then ensure the leaf itself.
pub fn ensure_path<S>(store: &mut S, request: &EnsurePathRequest) -> BridgeResult<EnsuredPath>
where
    S: PageStore + ?Sized,
{
    let mut leaf_path = slug::normalize_path(&request.full_path)?;
    if leaf_path.is_empty() {
        leaf_path = slug::normalize(&request.leaf_title)?;
    }

    let mut created_ancestors = Vec::new();
    let mut parent_id = None;
    for ancestor in slug::split(&leaf_path) {
        let page = ensure_ancestor(store, &ancestor, parent_id, &mut created_ancestors)?;
        parent_id = Some(page.id);
    }

    let draft = PageDraft::new(&leaf_path, &request.leaf_title, &request.leaf_content)
        .with_parent(parent_id);
    let draft = match &request.description {
        Some(description) => draft.with_description(description),
        None => draft,
    };
    let (leaf, leaf_created) = ensure_leaf(store, &draft)?;
    Ok(EnsuredPath {
        leaf,
        leaf_created,
        created_ancestors,
    })
}

fn ensure_ancestor<S>(
    store: &mut S,
    path: &str,
    parent_id: Option<i64>,
    created: &mut Vec<String>,
) -> BridgeResult<PageRecord>
where
    S: PageStore + ?Sized,
{
    let key = PageKey::Path(path.to_string());
    if let Some(existing) = store.get_page(&key).map_err(BridgeError::store)? {
        return Ok(existing);
    }

    let title = slug::title_from_segment(slug::last_segment(path));
    let draft = PageDraft::new(path, &title, placeholder_content(&title, path))
        .with_parent(parent_id);
    match store.create_page(&draft) {
        Ok(page) => {
            tracing::debug!(path, id = page.id, "created placeholder ancestor");
            created.push(path.to_string());
            Ok(page)
        }
        Err(create_error) => {
            // One re-check: a concurrent writer may have created it.
            let message = format!("{create_error:#}");
            tracing::warn!(path, error = %message, "ancestor creation failed; re-checking");
            match store.get_page(&key) {
                Ok(Some(page)) => Ok(page),
                Ok(None) => Err(BridgeError::AncestorCreation {
                    path: path.to_string(),
                    message,
                }),
                Err(refetch_error) => Err(BridgeError::AncestorCreation {
                    path: path.to_string(),
                    message: format!("{message}; re-check failed: {refetch_error:#}"),
                }),
            }
        }
    }
}

fn ensure_leaf<S>(store: &mut S, draft: &PageDraft) -> BridgeResult<(PageRecord, bool)>
where
    S: PageStore + ?Sized,
{
    let key = PageKey::Path(draft.path.clone());
    if let Some(existing) = store.get_page(&key).map_err(BridgeError::store)? {
        tracing::debug!(path = %draft.path, id = existing.id, "leaf already exists");
        return Ok((existing, false));
    }
    let page = store.create_page(draft).map_err(BridgeError::store)?;
    tracing::info!(path = %page.path, id = page.id, "created page");
    Ok((page, true))
}

fn placeholder_content(title: &str, path: &str) -> String {
    format!("# {title}\n\nParent page for pages under `{path}/`.\n")
}

/// Create `parent_path/normalize(title)`. Without `create_parents` a missing parent fails.
pub fn create_nested_page<S>(store: &mut S, request: &NestedPageRequest) -> BridgeResult<EnsuredPath>
where
    S: PageStore + ?Sized,
{
    let parent_path = slug::normalize_path(&request.parent_path)?;
    let leaf_path = slug::join(&parent_path, &slug::normalize(&request.title)?);

    if request.create_parents || parent_path.is_empty() {
        return ensure_path(
            store,
            &EnsurePathRequest {
                full_path: leaf_path,
                leaf_title: request.title.clone(),
                leaf_content: request.content.clone(),
                description: None,
            },
        );
    }

    let parent = store
        .get_page(&PageKey::Path(parent_path.clone()))
        .map_err(BridgeError::store)?
        .ok_or_else(|| BridgeError::not_found(PageKey::Path(parent_path).to_string()))?;
    let draft = PageDraft::new(leaf_path, &request.title, &request.content).with_parent(Some(parent.id));
    let (leaf, leaf_created) = ensure_leaf(store, &draft)?;
    Ok(EnsuredPath {
        leaf,
        leaf_created,
        created_ancestors: Vec::new(),
    })
}

/// Root page plus one page per section. Root failure is fatal; section failures are not.
pub fn create_structure<S>(store: &mut S, request: &StructureRequest) -> BridgeResult<StructureReport>
where
    S: PageStore + ?Sized,
{
    let sections: Vec<String> = if request.sections.is_empty() {
        DEFAULT_SECTIONS.iter().map(ToString::to_string).collect()
    } else {
        request.sections.clone()
    };

    let root_path = slug::normalize(&request.root_title)?;
    let root = ensure_path(
        store,
        &EnsurePathRequest {
            full_path: root_path.clone(),
            leaf_title: request.root_title.clone(),
            leaf_content: structure_root_content(request, &root_path, &sections),
            description: Some(request.description.clone()).filter(|d| !d.trim().is_empty()),
        },
    )?;

    let mut outcomes = Vec::with_capacity(sections.len());
    for title in &sections {
        let section_path = slug::normalize(title).map(|segment| slug::join(&root_path, &segment));
        let outcome = match section_path {
            Ok(path) => {
                let result = ensure_path(
                    store,
                    &EnsurePathRequest {
                        full_path: path.clone(),
                        leaf_title: title.clone(),
                        leaf_content: format!(
                            "# {title}\n\n{title} documentation for {}.\n",
                            request.root_title
                        ),
                        description: None,
                    },
                );
                SectionOutcome::from_result(title, Some(path), result)
            }
            Err(error) => SectionOutcome::from_result(title, None, Err(error)),
        };
        outcomes.push(outcome);
    }

    let failed_count = outcomes.iter().filter(|outcome| outcome.failed()).count();
    let created_count = outcomes.iter().filter(|outcome| outcome.created).count()
        + usize::from(root.leaf_created);
    Ok(StructureReport {
        root: root.leaf.summary(),
        root_created: root.leaf_created,
        status: ReportStatus::from_counts(outcomes.len() - failed_count, failed_count),
        sections: outcomes,
        created_count,
        failed_count,
    })
}

fn structure_root_content(request: &StructureRequest, root_path: &str, sections: &[String]) -> String {
    let mut content = format!("# {}\n\n", request.root_title);
    if !request.description.trim().is_empty() {
        content.push_str(request.description.trim());
        content.push_str("\n\n");
    }
    content.push_str("## Sections\n\n");
    for title in sections {
        match slug::normalize(title) {
            Ok(segment) => content.push_str(&format!("- [{title}](/{root_path}/{segment})\n")),
            Err(_) => content.push_str(&format!("- {title}\n")),
        }
    }
    content
}

/// Project page, one page per top-level source directory, one page per file, each file
/// linked to its page in the ledger.
pub fn create_documentation_hierarchy<S, L>(
    store: &mut S,
    ledger: &mut L,
    request: &DocsHierarchyRequest,
) -> BridgeResult<DocsHierarchyReport>
where
    S: PageStore + ?Sized,
    L: MappingLedger + ?Sized,
{
    let project_path = slug::normalize(&request.project_name)?;
    let mut grouped: BTreeMap<String, Vec<&DocFileSpec>> = BTreeMap::new();
    for file in &request.files {
        grouped.entry(category_for(&file.file_path)).or_default().push(file);
    }

    let project = ensure_path(
        store,
        &EnsurePathRequest {
            full_path: project_path.clone(),
            leaf_title: request.project_name.clone(),
            leaf_content: project_content(&request.project_name, &project_path, &grouped),
            description: Some(format!("{} documentation", request.project_name)),
        },
    )?;
    let mut created_pages = usize::from(project.leaf_created);

    let repository_key = normalize_for_display(&request.repository_root);
    let mut categories = Vec::with_capacity(grouped.len());
    let mut files = Vec::with_capacity(request.files.len());
    for (category, members) in &grouped {
        let category_path = slug::normalize(category).map(|segment| slug::join(&project_path, &segment));
        let category_result = match &category_path {
            Ok(path) => ensure_path(
                store,
                &EnsurePathRequest {
                    full_path: path.clone(),
                    leaf_title: category.clone(),
                    leaf_content: category_content(category, members),
                    description: Some(format!("Category: {category}")),
                },
            ),
            Err(error) => Err(BridgeError::InvalidTitle {
                title: format!("{category} ({error})"),
            }),
        };
        let outcome = SectionOutcome::from_result(category, category_path.ok(), category_result);
        created_pages += usize::from(outcome.created);

        for file in members {
            let file_outcome = match &outcome.path {
                Some(path) if !outcome.failed() => {
                    document_file(store, ledger, path, category, file, &request.repository_root, &repository_key)
                }
                _ => DocFileOutcome {
                    file_path: file.file_path.clone(),
                    category: category.clone(),
                    page: None,
                    created: false,
                    linked: false,
                    error: Some(format!("category page {category} unavailable")),
                },
            };
            created_pages += usize::from(file_outcome.created);
            files.push(file_outcome);
        }
        categories.push(outcome);
    }

    let failed_count = categories.iter().filter(|outcome| outcome.failed()).count()
        + files.iter().filter(|outcome| outcome.error.is_some()).count();
    let attempted = categories.len() + files.len();
    Ok(DocsHierarchyReport {
        project: project.leaf.summary(),
        categories,
        files,
        created_pages,
        failed_count,
        status: ReportStatus::from_counts(attempted - failed_count, failed_count),
    })
}

fn document_file<S, L>(
    store: &mut S,
    ledger: &mut L,
    category_path: &str,
    category: &str,
    file: &DocFileSpec,
    repository_root: &Path,
    repository_key: &str,
) -> DocFileOutcome
where
    S: PageStore + ?Sized,
    L: MappingLedger + ?Sized,
{
    let mut outcome = DocFileOutcome {
        file_path: file.file_path.clone(),
        category: category.to_string(),
        page: None,
        created: false,
        linked: false,
        error: None,
    };

    let doc_path = match file.doc_path.as_deref().filter(|path| !path.trim().is_empty()) {
        Some(path) => slug::normalize_path(path),
        None => slug::normalize(file_stem(&file.file_path)),
    };
    let result = doc_path.and_then(|doc_path| {
        let full_path = slug::join(category_path, &doc_path);
        let title = slug::title_from_segment(slug::last_segment(&full_path));
        ensure_path(
            store,
            &EnsurePathRequest {
                full_path,
                leaf_title: title.clone(),
                leaf_content: format!("# {title}\n\nDocumentation for `{}`.\n", file.file_path),
                description: Some(format!("Documentation for {}", file.file_path)),
            },
        )
    });
    let ensured = match result {
        Ok(ensured) => ensured,
        Err(error) => {
            tracing::warn!(file = %file.file_path, error = %error, "documentation page failed");
            outcome.error = Some(error.to_string());
            return outcome;
        }
    };
    outcome.page = Some(ensured.leaf.summary());
    outcome.created = ensured.leaf_created;

    let file_key = mapping::ledger_file_key(repository_root, Path::new(&file.file_path));
    let link = mapping::file_content_hash(&repository_root.join(&file_key))
        .map_err(BridgeError::ledger)
        .and_then(|hash| {
            mapping::record_link(
                ledger,
                repository_key,
                &file_key,
                ensured.leaf.id,
                DEFAULT_RELATIONSHIP,
                hash,
            )
        });
    match link {
        Ok(_) => outcome.linked = true,
        Err(error) => outcome.error = Some(error.to_string()),
    }
    outcome
}

/// First directory of the path, title-cased; top-level files fall into `Other`.
fn category_for(file_path: &str) -> String {
    let trimmed = file_path.trim_start_matches("./").trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((first, _)) => match slug::normalize(first) {
            Ok(segment) => slug::title_from_segment(&segment),
            Err(_) => FALLBACK_CATEGORY.to_string(),
        },
        None => FALLBACK_CATEGORY.to_string(),
    }
}

fn file_stem(file_path: &str) -> &str {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn project_content(
    project_name: &str,
    project_path: &str,
    grouped: &BTreeMap<String, Vec<&DocFileSpec>>,
) -> String {
    let mut content = format!(
        "# {project_name} Documentation\n\nGenerated from the project file structure.\n\n## Categories\n\n"
    );
    for (category, members) in grouped {
        let link = slug::normalize(category).unwrap_or_default();
        content.push_str(&format!(
            "- [{category}](/{project_path}/{link}) ({} files)\n",
            members.len()
        ));
    }
    content
}

fn category_content(category: &str, members: &[&DocFileSpec]) -> String {
    let mut content = format!("# {category}\n\n## Files\n\n");
    for file in members {
        content.push_str(&format!("- `{}`\n", file.file_path));
    }
    content
}

/// Direct children of a page. Fails when neither the page nor any children exist.
pub fn get_children<S>(store: &mut S, key: &PageKey) -> BridgeResult<ChildrenReport>
where
    S: PageStore + ?Sized,
{
    let (parent_path, parent) = match key {
        PageKey::Id(_) => {
            let parent = store
                .get_page(key)
                .map_err(BridgeError::store)?
                .ok_or_else(|| BridgeError::not_found(key.to_string()))?;
            (parent.path.clone(), Some(parent))
        }
        PageKey::Path(raw) => {
            let path = slug::normalize_path(raw)?;
            let parent = store
                .get_page(&PageKey::Path(path.clone()))
                .map_err(BridgeError::store)?;
            (path, parent)
        }
    };

    let mut children = store
        .list_children(&parent_path)
        .map_err(BridgeError::store)?;
    if parent.is_none() && children.is_empty() {
        return Err(BridgeError::not_found(key.to_string()));
    }
    children.sort_by(|left, right| left.path.cmp(&right.path));

    let children = children.iter().map(PageRecord::summary).collect::<Vec<_>>();
    Ok(ChildrenReport {
        parent_path,
        parent: parent.as_ref().map(PageRecord::summary),
        total_children: children.len(),
        children,
    })
}
