use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};
use crate::ledger::MappingLedger;
use crate::store::{PageKey, PageStore};

#[derive(Debug, Clone, Serialize)]
pub struct OrphanDetail {
    pub file_path: String,
    pub page_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidMapping {
    pub file_path: String,
    pub page_id: i64,
    pub page_title: String,
    pub page_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub total_mappings: usize,
    pub valid_mappings: usize,
    pub orphaned_mappings: usize,
    pub cleaned_count: usize,
    /// Orphans whose ledger entry could not be removed.
    pub cleanup_failures: usize,
    pub orphaned_details: Vec<OrphanDetail>,
    pub valid_details: Vec<ValidMapping>,
}

/// Remove ledger entries whose page no longer resolves.
///
/// The ledger is snapshotted before any page lookup. A lookup that errors is treated the same
/// as an absent page. A failed removal is counted and the remaining orphans are still
/// processed.
pub fn reconcile<S, L>(store: &mut S, ledger: &mut L) -> BridgeResult<ReconcileReport>
where
    S: PageStore + ?Sized,
    L: MappingLedger + ?Sized,
{
    let snapshot = ledger.list_all().map_err(BridgeError::ledger)?;
    let total_mappings = snapshot.len();
    let mut orphaned_details = Vec::new();
    let mut valid_details = Vec::new();

    for mapping in snapshot {
        let reason = match store.get_page(&PageKey::Id(mapping.page_id)) {
            Ok(Some(page)) => {
                valid_details.push(ValidMapping {
                    file_path: mapping.file_path,
                    page_id: page.id,
                    page_title: page.title,
                    page_path: page.path,
                });
                continue;
            }
            Ok(None) => "page no longer exists".to_string(),
            Err(error) => format!("page lookup failed: {error:#}"),
        };
        orphaned_details.push(OrphanDetail {
            file_path: mapping.file_path,
            page_id: mapping.page_id,
            reason,
        });
    }

    let mut cleaned_count = 0;
    let mut cleanup_failures = 0;
    for orphan in &orphaned_details {
        match ledger.remove(&orphan.file_path) {
            Ok(true) => {
                cleaned_count += 1;
                tracing::debug!(file = %orphan.file_path, page_id = orphan.page_id, reason = %orphan.reason, "removed orphaned mapping");
            }
            Ok(false) => {}
            Err(error) => {
                let message = format!("{error:#}");
                cleanup_failures += 1;
                tracing::warn!(file = %orphan.file_path, error = %message, "failed to remove orphaned mapping");
            }
        }
    }

    tracing::info!(
        total = total_mappings,
        orphaned = orphaned_details.len(),
        cleaned = cleaned_count,
        failed = cleanup_failures,
        "reconciled file mappings"
    );
    Ok(ReconcileReport {
        total_mappings,
        valid_mappings: valid_details.len(),
        orphaned_mappings: orphaned_details.len(),
        cleaned_count,
        cleanup_failures,
        orphaned_details,
        valid_details,
    })
}
