use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{BridgeError, BridgeResult};
use crate::ledger::{FileMapping, MappingLedger};
use crate::runtime::normalize_for_display;
use crate::store::{PageKey, PageStore, PageSummary};

pub const DEFAULT_RELATIONSHIP: &str = "documents";

#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub file_path: PathBuf,
    pub page_id: i64,
    pub relationship: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub linked: bool,
    pub page: PageSummary,
    pub file_exists: bool,
    pub mapping: FileMapping,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlinkReport {
    pub file_path: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryContext {
    pub repository_root: String,
    pub mapped_files: usize,
    pub mappings: Vec<FileMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftState {
    Unchanged,
    Changed,
    Missing,
    /// No hash was recorded at link time.
    Unhashed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    pub file_path: String,
    pub page_id: i64,
    pub state: DriftState,
    pub stored_hash: Option<String>,
    pub current_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub repository_root: String,
    pub total: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub missing: usize,
    pub unhashed: usize,
    pub entries: Vec<DriftEntry>,
}

/// Link a file to an existing page, recording the file's current hash.
pub fn link_file_to_page<S, L>(
    store: &mut S,
    ledger: &mut L,
    repository_root: &Path,
    request: &LinkRequest,
) -> BridgeResult<LinkReport>
where
    S: PageStore + ?Sized,
    L: MappingLedger + ?Sized,
{
    let page = store
        .get_page(&PageKey::Id(request.page_id))
        .map_err(BridgeError::store)?
        .ok_or_else(|| BridgeError::not_found(PageKey::Id(request.page_id).to_string()))?;

    let file_key = ledger_file_key(repository_root, &request.file_path);
    let absolute = repository_root.join(&file_key);
    let content_hash = file_content_hash(&absolute).map_err(BridgeError::ledger)?;
    let file_exists = content_hash.is_some();
    if !file_exists {
        tracing::warn!(file = %file_key, "linked file does not exist on disk; no hash recorded");
    }

    let mapping = record_link(
        ledger,
        &normalize_for_display(repository_root),
        &file_key,
        page.id,
        &request.relationship,
        content_hash,
    )?;
    tracing::info!(file = %file_key, page_id = page.id, "linked file to page");

    Ok(LinkReport {
        linked: true,
        page: page.summary(),
        file_exists,
        mapping,
    })
}

/// Upsert a mapping row stamped with the current time.
pub fn record_link<L>(
    ledger: &mut L,
    repository_root: &str,
    file_path: &str,
    page_id: i64,
    relationship: &str,
    content_hash: Option<String>,
) -> BridgeResult<FileMapping>
where
    L: MappingLedger + ?Sized,
{
    let mapping = FileMapping {
        file_path: file_path.to_string(),
        page_id,
        relationship: relationship.to_string(),
        last_synced_at_unix: unix_timestamp().map_err(BridgeError::ledger)?,
        content_hash,
        repository_root: repository_root.to_string(),
    };
    ledger.put(&mapping).map_err(BridgeError::ledger)?;
    Ok(mapping)
}

pub fn unlink<L>(ledger: &mut L, repository_root: &Path, file_path: &Path) -> BridgeResult<UnlinkReport>
where
    L: MappingLedger + ?Sized,
{
    let file_key = ledger_file_key(repository_root, file_path);
    let removed = ledger.remove(&file_key).map_err(BridgeError::ledger)?;
    Ok(UnlinkReport {
        file_path: file_key,
        removed,
    })
}

pub fn repository_context<L>(ledger: &L, repository_root: &Path) -> BridgeResult<RepositoryContext>
where
    L: MappingLedger + ?Sized,
{
    let root = normalize_for_display(repository_root);
    let mappings = ledger
        .list_for_repository(&root)
        .map_err(BridgeError::ledger)?;
    Ok(RepositoryContext {
        repository_root: root,
        mapped_files: mappings.len(),
        mappings,
    })
}

/// Compare stored hashes with the files currently on disk. Read-only.
pub fn check_drift<L>(ledger: &L, repository_root: &Path) -> BridgeResult<DriftReport>
where
    L: MappingLedger + ?Sized,
{
    let root = normalize_for_display(repository_root);
    let mappings = ledger
        .list_for_repository(&root)
        .map_err(BridgeError::ledger)?;

    let mut entries = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let current_hash = file_content_hash(&repository_root.join(&mapping.file_path))
            .map_err(BridgeError::ledger)?;
        let state = match (&mapping.content_hash, &current_hash) {
            (_, None) => DriftState::Missing,
            (None, Some(_)) => DriftState::Unhashed,
            (Some(stored), Some(current)) if stored == current => DriftState::Unchanged,
            (Some(_), Some(_)) => DriftState::Changed,
        };
        entries.push(DriftEntry {
            file_path: mapping.file_path,
            page_id: mapping.page_id,
            state,
            stored_hash: mapping.content_hash,
            current_hash,
        });
    }

    let count = |state: DriftState| entries.iter().filter(|entry| entry.state == state).count();
    Ok(DriftReport {
        repository_root: root,
        total: entries.len(),
        unchanged: count(DriftState::Unchanged),
        changed: count(DriftState::Changed),
        missing: count(DriftState::Missing),
        unhashed: count(DriftState::Unhashed),
        entries,
    })
}

/// Full SHA-256 hex digest of a file, `None` when it is not a regular file.
pub fn file_content_hash(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let digest = Sha256::digest(&bytes);
    let mut output = String::with_capacity(64);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    Ok(Some(output))
}

/// Repository-relative `/`-separated key when the file lies inside the root.
pub fn ledger_file_key(repository_root: &Path, file_path: &Path) -> String {
    let relative = if file_path.is_absolute() {
        file_path.strip_prefix(repository_root).unwrap_or(file_path)
    } else {
        file_path
    };
    normalize_for_display(relative)
        .trim_start_matches("./")
        .to_string()
}

fn unix_timestamp() -> Result<i64> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?
        .as_secs();
    i64::try_from(seconds).context("timestamp does not fit into i64")
}
