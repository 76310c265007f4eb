use std::collections::HashSet;

use serde::Serialize;

use crate::deletion::remove_mappings_for;
use crate::error::{BridgeError, BridgeResult};
use crate::ledger::MappingLedger;
use crate::report::ReportStatus;
use crate::store::{PageKey, PageRecord, PageStore, PageSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSelector {
    Ids(Vec<i64>),
    Paths(Vec<String>),
    /// Glob over full page paths where `*` is the only metacharacter.
    Pattern(String),
}

impl BatchSelector {
    /// Build a selector from optional parts; exactly one must be non-empty.
    pub fn from_parts(
        ids: Vec<i64>,
        paths: Vec<String>,
        pattern: Option<String>,
    ) -> BridgeResult<Self> {
        let pattern = pattern.filter(|pattern| !pattern.is_empty());
        let provided =
            usize::from(!ids.is_empty()) + usize::from(!paths.is_empty()) + usize::from(pattern.is_some());
        if provided != 1 {
            return Err(BridgeError::InvalidSelector {
                reason: format!(
                    "exactly one of ids, paths or pattern must be given ({provided} provided)"
                ),
            });
        }
        Ok(if !ids.is_empty() {
            Self::Ids(ids)
        } else if !paths.is_empty() {
            Self::Paths(paths)
        } else {
            Self::Pattern(pattern.unwrap_or_default())
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ids(_) => "ids",
            Self::Paths(_) => "paths",
            Self::Pattern(_) => "pattern",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchDeleteRequest {
    pub selector: BatchSelector,
    pub confirmed: bool,
    pub remove_file_mappings: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: i64,
    pub title: String,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub selector: &'static str,
    pub pattern: Option<String>,
    pub confirmed: bool,
    pub total_found: usize,
    pub deleted_count: usize,
    pub failed_count: usize,
    pub deleted_pages: Vec<PageSummary>,
    pub failed_deletions: Vec<BatchFailure>,
    pub planned_pages: Vec<PageSummary>,
    /// Ids or paths that resolved to no page.
    pub not_found: Vec<String>,
    pub mappings_removed: usize,
    pub mapping_failures: usize,
    pub safety_note: Option<String>,
    pub status: ReportStatus,
}

/// Anchored, case-sensitive match where `*` is zero or more of any character.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let parts = pattern.split('*').collect::<Vec<_>>();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return text.is_empty(),
    };
    if rest.is_empty() {
        return pattern == text;
    }

    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return true,
    };
    if remaining.len() < last.len() || !remaining.ends_with(last) {
        return false;
    }
    remaining = &remaining[..remaining.len() - last.len()];
    for part in middle {
        match remaining.find(part) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    true
}

/// Delete the pages a selector resolves to. No ordering between targets.
pub fn batch_delete<S, L>(
    store: &mut S,
    ledger: &mut L,
    request: &BatchDeleteRequest,
) -> BridgeResult<BatchReport>
where
    S: PageStore + ?Sized,
    L: MappingLedger + ?Sized,
{
    let (targets, not_found) = resolve_selector(store, &request.selector)?;
    let planned = targets.iter().map(PageRecord::summary).collect::<Vec<_>>();

    let mut report = BatchReport {
        selector: request.selector.kind(),
        pattern: match &request.selector {
            BatchSelector::Pattern(pattern) => Some(pattern.clone()),
            _ => None,
        },
        confirmed: request.confirmed,
        total_found: targets.len(),
        deleted_count: 0,
        failed_count: 0,
        deleted_pages: Vec::new(),
        failed_deletions: Vec::new(),
        planned_pages: Vec::new(),
        not_found,
        mappings_removed: 0,
        mapping_failures: 0,
        safety_note: None,
        status: ReportStatus::Preview,
    };

    if !request.confirmed {
        report.safety_note = Some(format!(
            "Preview only: {} page(s) would be deleted. Re-run with confirmation to delete.",
            targets.len()
        ));
        report.planned_pages = planned;
        return Ok(report);
    }

    for page in &targets {
        match store.delete_page(page.id) {
            Ok(()) => report.deleted_pages.push(page.summary()),
            Err(error) => {
                let message = format!("{error:#}");
                tracing::warn!(id = page.id, path = %page.path, error = %message, "batch deletion failed");
                report.failed_deletions.push(BatchFailure {
                    id: page.id,
                    title: page.title.clone(),
                    path: page.path.clone(),
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
        selector = report.selector,
        deleted = report.deleted_count,
        failed = report.failed_count,
        "batch deletion finished"
    );
    Ok(report)
}

fn resolve_selector<S>(
    store: &mut S,
    selector: &BatchSelector,
) -> BridgeResult<(Vec<PageRecord>, Vec<String>)>
where
    S: PageStore + ?Sized,
{
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut not_found = Vec::new();

    match selector {
        BatchSelector::Ids(ids) => {
            for id in ids {
                match store.get_page(&PageKey::Id(*id)).map_err(BridgeError::store)? {
                    Some(page) => {
                        if seen.insert(page.id) {
                            targets.push(page);
                        }
                    }
                    None => not_found.push(id.to_string()),
                }
            }
        }
        BatchSelector::Paths(paths) => {
            for path in paths {
                let path = path.trim().trim_matches('/');
                match store
                    .get_page(&PageKey::Path(path.to_string()))
                    .map_err(BridgeError::store)?
                {
                    Some(page) => {
                        if seen.insert(page.id) {
                            targets.push(page);
                        }
                    }
                    None => not_found.push(path.to_string()),
                }
            }
        }
        BatchSelector::Pattern(pattern) => {
            if pattern.is_empty() {
                return Err(BridgeError::InvalidSelector {
                    reason: "pattern is empty".to_string(),
                });
            }
            for page in store.list_pages().map_err(BridgeError::store)? {
                if pattern_matches(pattern, &page.path) && seen.insert(page.id) {
                    targets.push(page);
                }
            }
        }
    }

    Ok((targets, not_found))
}
