//! Hierarchy and single-page deletion.
//!
//! Planning selects every page under `root/` from a single listing, so pages below a
//! missing intermediate page are still part of the subtree. Unconfirmed requests stop after
//! planning and return a preview of the same shape as a real run.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::TraversalLimits;
use crate::error::{BridgeError, BridgeResult};
use crate::ledger::MappingLedger;
use crate::report::ReportStatus;
use crate::slug;
use crate::store::{PageKey, PageRecord, PageStore, PageSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionMode {
    ChildrenOnly,
    IncludeRoot,
    RootOnly,
}

impl DeletionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChildrenOnly => "children_only",
            Self::IncludeRoot => "include_root",
            Self::RootOnly => "root_only",
        }
    }
}

impl fmt::Display for DeletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionMode {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().replace('-', "_").as_str() {
            "children_only" => Ok(Self::ChildrenOnly),
            "include_root" => Ok(Self::IncludeRoot),
            "root_only" => Ok(Self::RootOnly),
            other => Err(BridgeError::InvalidArgument {
                reason: format!(
                    "unknown delete mode {other:?} (expected children_only, include_root or root_only)"
                ),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyDeleteRequest {
    pub root_path: String,
    pub mode: DeletionMode,
    pub confirmed: bool,
    pub remove_file_mappings: bool,
}

impl HierarchyDeleteRequest {
    /// Unconfirmed, with ledger cleanup enabled.
    pub fn new(root_path: impl Into<String>, mode: DeletionMode) -> Self {
        Self {
            root_path: root_path.into(),
            mode,
            confirmed: false,
            remove_file_mappings: true,
        }
    }

    pub fn confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPage {
    pub id: i64,
    pub title: String,
    pub path: String,
    pub depth: usize,
}

impl PlannedPage {
    fn new(page: &PageRecord, depth: usize) -> Self {
        Self {
            id: page.id,
            title: page.title.clone(),
            path: page.path.clone(),
            depth,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionFailure {
    pub id: i64,
    pub title: String,
    pub path: String,
    pub depth: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HierarchySummary {
    pub root_found: bool,
    pub descendant_count: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub root_path: String,
    pub mode: DeletionMode,
    pub confirmed: bool,
    pub total_found: usize,
    pub deleted_count: usize,
    pub failed_count: usize,
    pub deleted_pages: Vec<PlannedPage>,
    pub failed_deletions: Vec<DeletionFailure>,
    /// Pages selected for deletion, deepest first.
    pub planned_pages: Vec<PlannedPage>,
    pub hierarchy_summary: HierarchySummary,
    pub mappings_removed: usize,
    pub mapping_failures: usize,
    pub safety_note: Option<String>,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SingleDeleteReport {
    pub deleted: bool,
    pub page: PageSummary,
    pub mappings_removed: usize,
    pub mapping_error: Option<String>,
}

struct Subtree {
    root: Option<PageRecord>,
    descendants: Vec<PlannedPage>,
}

/// Plan the subtree deletion and, when confirmed, delete deepest-first.
pub fn plan_and_delete<S, L>(
    store: &mut S,
    ledger: &mut L,
    limits: TraversalLimits,
    request: &HierarchyDeleteRequest,
) -> BridgeResult<DeletionReport>
where
    S: PageStore + ?Sized,
    L: MappingLedger + ?Sized,
{
    let root_path = slug::normalize_path(&request.root_path)?;
    if root_path.is_empty() {
        return Err(BridgeError::InvalidArgument {
            reason: "hierarchy root path is empty".to_string(),
        });
    }

    let subtree = collect_subtree(store, &root_path, limits)?;
    if subtree.root.is_none() && request.mode == DeletionMode::RootOnly {
        return Err(BridgeError::not_found(PageKey::Path(root_path).to_string()));
    }

    let hierarchy_summary = HierarchySummary {
        root_found: subtree.root.is_some(),
        descendant_count: subtree.descendants.len(),
        max_depth: subtree
            .descendants
            .iter()
            .map(|page| page.depth)
            .max()
            .unwrap_or(0),
    };

    let root_entry = subtree.root.as_ref().map(|root| PlannedPage::new(root, 0));
    let mut planned = match request.mode {
        DeletionMode::ChildrenOnly => subtree.descendants,
        DeletionMode::IncludeRoot => subtree.descendants.into_iter().chain(root_entry).collect(),
        DeletionMode::RootOnly => root_entry.into_iter().collect(),
    };
    planned.sort_by(|left, right| {
        right
            .depth
            .cmp(&left.depth)
            .then_with(|| left.path.cmp(&right.path))
    });

    let mut report = DeletionReport {
        root_path,
        mode: request.mode,
        confirmed: request.confirmed,
        total_found: planned.len(),
        deleted_count: 0,
        failed_count: 0,
        deleted_pages: Vec::new(),
        failed_deletions: Vec::new(),
        planned_pages: Vec::new(),
        hierarchy_summary,
        mappings_removed: 0,
        mapping_failures: 0,
        safety_note: None,
        status: ReportStatus::Preview,
    };

    if !request.confirmed {
        report.safety_note = Some(format!(
            "Preview only: {} page(s) would be deleted. Re-run with confirmation to delete.",
            planned.len()
        ));
        report.planned_pages = planned;
        return Ok(report);
    }

    for page in &planned {
        match store.delete_page(page.id) {
            Ok(()) => report.deleted_pages.push(page.clone()),
            Err(error) => {
                let message = format!("{error:#}");
                tracing::warn!(id = page.id, path = %page.path, error = %message, "page deletion failed");
                report.failed_deletions.push(DeletionFailure {
                    id: page.id,
                    title: page.title.clone(),
                    path: page.path.clone(),
                    depth: page.depth,
                    error: message,
                });
            }
        }
    }
    report.deleted_count = report.deleted_pages.len();
    report.failed_count = report.failed_deletions.len();

    if request.remove_file_mappings {
        let deleted_ids = report.deleted_pages.iter().map(|page| page.id).collect::<Vec<_>>();
        let (removed, failures) = remove_mappings_for(ledger, &deleted_ids);
        report.mappings_removed = removed;
        report.mapping_failures = failures;
    }

    report.planned_pages = planned;
    report.status = ReportStatus::from_counts(report.deleted_count, report.failed_count);
    tracing::info!(
        root = %report.root_path,
        mode = %report.mode,
        deleted = report.deleted_count,
        failed = report.failed_count,
        "hierarchy deletion finished"
    );
    Ok(report)
}

fn collect_subtree<S>(store: &mut S, root_path: &str, limits: TraversalLimits) -> BridgeResult<Subtree>
where
    S: PageStore + ?Sized,
{
    let mut pages = store.list_pages().map_err(BridgeError::store)?;
    pages.sort_by(|left, right| left.path.cmp(&right.path));

    let prefix = format!("{root_path}/");
    let root_depth = slug::depth(root_path);
    let mut root = None;
    let mut descendants = Vec::new();
    let mut seen = HashSet::new();
    for page in pages {
        if page.path == root_path {
            if seen.insert(page.id) {
                root = Some(page);
            }
            continue;
        }
        if !page.path.starts_with(&prefix) || !seen.insert(page.id) {
            continue;
        }
        let depth = slug::depth(&page.path) - root_depth;
        if depth > limits.max_depth {
            return Err(BridgeError::TraversalLimit {
                root: root_path.to_string(),
                limit: format!("depth {depth} exceeds max_depth {}", limits.max_depth),
            });
        }
        if descendants.len() >= limits.max_nodes {
            return Err(BridgeError::TraversalLimit {
                root: root_path.to_string(),
                limit: format!("more than max_nodes {} descendants", limits.max_nodes),
            });
        }
        descendants.push(PlannedPage::new(&page, depth));
    }

    Ok(Subtree { root, descendants })
}

/// Best-effort ledger cleanup. Returns `(entries removed, page ids whose cleanup failed)`.
pub(crate) fn remove_mappings_for<L>(ledger: &mut L, page_ids: &[i64]) -> (usize, usize)
where
    L: MappingLedger + ?Sized,
{
    let mut removed = 0;
    let mut failures = 0;
    for id in page_ids {
        match ledger.remove_by_page_id(*id) {
            Ok(count) => removed += count,
            Err(error) => {
                let message = format!("{error:#}");
                tracing::warn!(page_id = *id, error = %message, "failed to remove file mappings");
                failures += 1;
            }
        }
    }
    (removed, failures)
}

/// Delete one page. Requires confirmation; store failures surface directly.
pub fn delete_page<S, L>(
    store: &mut S,
    ledger: &mut L,
    key: &PageKey,
    confirmed: bool,
    remove_file_mappings: bool,
) -> BridgeResult<SingleDeleteReport>
where
    S: PageStore + ?Sized,
    L: MappingLedger + ?Sized,
{
    if !confirmed {
        return Err(BridgeError::ConfirmationRequired {
            operation: format!("delete {key}"),
        });
    }
    let page = store
        .get_page(key)
        .map_err(BridgeError::store)?
        .ok_or_else(|| BridgeError::not_found(key.to_string()))?;
    store.delete_page(page.id).map_err(BridgeError::store)?;
    tracing::info!(id = page.id, path = %page.path, "deleted page");

    let mut report = SingleDeleteReport {
        deleted: true,
        page: page.summary(),
        mappings_removed: 0,
        mapping_error: None,
    };
    if remove_file_mappings {
        match ledger.remove_by_page_id(page.id) {
            Ok(count) => report.mappings_removed = count,
            Err(error) => report.mapping_error = Some(format!("{error:#}")),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{FileMapping, SqliteLedger};
    use crate::testing::MemoryStore;

    const TREE: &[&str] = &[
        "docs",
        "docs/api",
        "docs/api/users",
        "docs/api/users/create",
        "docs/guide",
        "docs/guide/install",
        "blog",
    ];

    fn link(ledger: &mut SqliteLedger, file_path: &str, page_id: i64) {
        ledger
            .put(&FileMapping {
                file_path: file_path.to_string(),
                page_id,
                relationship: "documents".to_string(),
                last_synced_at_unix: 0,
                content_hash: None,
                repository_root: "/repo".to_string(),
            })
            .expect("put");
    }

    #[test]
    fn unconfirmed_plan_never_deletes() {
        let mut store = MemoryStore::with_paths(TREE);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        let before = store.page_count();

        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::ChildrenOnly),
        )
        .expect("preview");

        assert_eq!(store.page_count(), before);
        assert!(store.deleted_ids.is_empty());
        assert_eq!(report.deleted_count, 0);
        assert_eq!(report.total_found, 5);
        assert_eq!(report.planned_pages.len(), 5);
        assert!(report.safety_note.is_some());
        assert_eq!(report.status, ReportStatus::Preview);
        assert_eq!(report.hierarchy_summary.max_depth, 3);
    }

    #[test]
    fn include_root_deletes_deepest_first_and_clears_subtree() {
        let mut store = MemoryStore::with_paths(TREE);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        let users = store.id_of("docs/api/users").expect("users");
        link(&mut ledger, "src/users.rs", users);
        link(&mut ledger, "src/users_api.rs", users);

        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::IncludeRoot).confirmed(true),
        )
        .expect("delete");

        assert_eq!(report.deleted_count, 6);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.status, ReportStatus::Completed);
        let depths = report
            .deleted_pages
            .iter()
            .map(|page| page.depth)
            .collect::<Vec<_>>();
        assert!(depths.windows(2).all(|pair| pair[0] >= pair[1]), "{depths:?}");
        assert_eq!(report.deleted_pages.last().map(|page| page.path.as_str()), Some("docs"));

        assert_eq!(store.page_count(), 1);
        assert!(store.has_path("blog"));
        assert_eq!(report.mappings_removed, 2);
        assert!(ledger.list_all().expect("list").is_empty());
    }

    #[test]
    fn store_deletion_order_is_non_increasing_in_depth() {
        let mut store = MemoryStore::with_paths(TREE);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::ChildrenOnly).confirmed(true),
        )
        .expect("delete");

        assert_eq!(store.deleted_ids.len(), 5);
        assert!(store.has_path("docs"));
        let mut last_depth = usize::MAX;
        for id in &store.deleted_ids {
            let depth = slug::depth(TREE[usize::try_from(*id - 1).expect("index")]);
            assert!(depth <= last_depth);
            last_depth = depth;
        }
    }

    #[test]
    fn root_only_leaves_descendants_orphaned() {
        let mut store = MemoryStore::with_paths(&["docs", "docs/api", "docs/api/users"]);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::RootOnly).confirmed(true),
        )
        .expect("delete");

        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.deleted_pages[0].path, "docs");
        assert_eq!(report.hierarchy_summary.descendant_count, 2);
        assert!(!store.has_path("docs"));
        assert!(store.has_path("docs/api"));
        assert!(store.has_path("docs/api/users"));
    }

    #[test]
    fn descendants_below_a_missing_intermediate_page_are_deleted() {
        let mut store = MemoryStore::with_paths(&["docs", "docs/api/users", "docs/guide", "docsite"]);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");

        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::IncludeRoot).confirmed(true),
        )
        .expect("delete");

        assert_eq!(report.deleted_count, 3);
        assert_eq!(report.deleted_pages[0].path, "docs/api/users");
        assert_eq!(report.deleted_pages[0].depth, 2);
        assert!(!store.has_path("docs/api/users"));
        assert_eq!(store.page_count(), 1);
        assert!(store.has_path("docsite"));
    }

    #[test]
    fn root_only_then_children_only_clears_the_orphans() {
        let mut store = MemoryStore::with_paths(&["docs", "docs/api", "docs/api/users"]);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs/api", DeletionMode::RootOnly).confirmed(true),
        )
        .expect("root only");
        assert!(store.has_path("docs/api/users"));

        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::ChildrenOnly).confirmed(true),
        )
        .expect("children only");
        assert_eq!(report.deleted_count, 1);
        assert!(!store.has_path("docs/api/users"));
        assert!(store.has_path("docs"));
    }

    #[test]
    fn planning_lists_the_store_once() {
        let mut paths = vec!["docs".to_string()];
        for section in 0..5 {
            paths.push(format!("docs/s{section}"));
            for page in 0..9 {
                paths.push(format!("docs/s{section}/p{page}"));
            }
        }
        let paths = paths.iter().map(String::as_str).collect::<Vec<_>>();
        let mut store = MemoryStore::with_paths(&paths);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");

        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::ChildrenOnly),
        )
        .expect("preview");
        assert_eq!(report.total_found, 50);
        assert_eq!(store.requests, 1);
    }

    #[test]
    fn missing_root_is_fatal_only_for_root_only() {
        let mut store = MemoryStore::with_paths(&["team/alpha"]);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");

        let error = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("team", DeletionMode::RootOnly).confirmed(true),
        )
        .expect_err("must fail");
        assert!(matches!(error, BridgeError::NotFound { .. }));

        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("team", DeletionMode::IncludeRoot),
        )
        .expect("preview");
        assert!(!report.hierarchy_summary.root_found);
        assert_eq!(report.total_found, 1);

        let empty = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("nothing", DeletionMode::ChildrenOnly).confirmed(true),
        )
        .expect("empty");
        assert_eq!(empty.total_found, 0);
        assert_eq!(empty.status, ReportStatus::Completed);
    }

    #[test]
    fn one_failed_deletion_does_not_stop_the_rest() {
        let mut store = MemoryStore::with_paths(TREE);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        let api = store.id_of("docs/api").expect("api");
        store.fail_delete_ids.insert(api);
        link(&mut ledger, "src/api.rs", api);

        let report = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits::default(),
            &HierarchyDeleteRequest::new("docs", DeletionMode::ChildrenOnly).confirmed(true),
        )
        .expect("delete");

        assert_eq!(report.deleted_count, 4);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.failed_deletions[0].path, "docs/api");
        assert!(report.failed_deletions[0].error.contains("delete rejected"));
        assert_eq!(report.status, ReportStatus::PartialFailure);
        assert!(ledger.get("src/api.rs").expect("get").is_some());
    }

    #[test]
    fn opting_out_keeps_ledger_entries() {
        let mut store = MemoryStore::with_paths(&["docs", "docs/api"]);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        let api = store.id_of("docs/api").expect("api");
        link(&mut ledger, "src/api.rs", api);

        let mut request = HierarchyDeleteRequest::new("docs", DeletionMode::ChildrenOnly).confirmed(true);
        request.remove_file_mappings = false;
        let report = plan_and_delete(&mut store, &mut ledger, TraversalLimits::default(), &request)
            .expect("delete");
        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.mappings_removed, 0);
        assert!(ledger.get("src/api.rs").expect("get").is_some());
    }

    #[test]
    fn traversal_limits_are_errors_not_truncation() {
        let mut store = MemoryStore::with_paths(TREE);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");

        let error = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits {
                max_depth: 2,
                max_nodes: 100,
            },
            &HierarchyDeleteRequest::new("docs", DeletionMode::IncludeRoot).confirmed(true),
        )
        .expect_err("depth limit");
        assert!(matches!(error, BridgeError::TraversalLimit { .. }));

        let error = plan_and_delete(
            &mut store,
            &mut ledger,
            TraversalLimits {
                max_depth: 10,
                max_nodes: 3,
            },
            &HierarchyDeleteRequest::new("docs", DeletionMode::IncludeRoot).confirmed(true),
        )
        .expect_err("node limit");
        assert!(matches!(error, BridgeError::TraversalLimit { .. }));
        assert!(store.deleted_ids.is_empty());
    }

    #[test]
    fn delete_mode_parses_both_spellings() {
        assert_eq!("children_only".parse::<DeletionMode>().expect("mode"), DeletionMode::ChildrenOnly);
        assert_eq!("include-root".parse::<DeletionMode>().expect("mode"), DeletionMode::IncludeRoot);
        let error = "everything".parse::<DeletionMode>().expect_err("unknown mode");
        assert!(matches!(error, BridgeError::InvalidArgument { .. }));
    }

    #[test]
    fn single_delete_requires_confirmation() {
        let mut store = MemoryStore::with_paths(&["docs"]);
        let mut ledger = SqliteLedger::open_in_memory().expect("ledger");
        let key = PageKey::Path("docs".to_string());

        let error = delete_page(&mut store, &mut ledger, &key, false, true).expect_err("must fail");
        assert!(matches!(error, BridgeError::ConfirmationRequired { .. }));
        assert_eq!(store.requests, 0);

        let id = store.id_of("docs").expect("docs");
        link(&mut ledger, "README.md", id);
        let report = delete_page(&mut store, &mut ledger, &key, true, true).expect("delete");
        assert!(report.deleted);
        assert_eq!(report.mappings_removed, 1);
        assert!(!store.has_path("docs"));

        let error = delete_page(&mut store, &mut ledger, &key, true, true).expect_err("gone");
        assert!(matches!(error, BridgeError::NotFound { .. }));
    }
}
