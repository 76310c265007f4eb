use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::migrate::{MigrateReport, run_migrations};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMapping {
    pub file_path: String,
    pub page_id: i64,
    pub relationship: String,
    pub last_synced_at_unix: i64,
    pub content_hash: Option<String>,
    pub repository_root: String,
}

/// Keyed store of file-to-page links, keyed by `file_path`.
pub trait MappingLedger {
    fn get(&self, file_path: &str) -> Result<Option<FileMapping>>;
    fn put(&mut self, entry: &FileMapping) -> Result<()>;
    /// Returns whether an entry existed.
    fn remove(&mut self, file_path: &str) -> Result<bool>;
    /// Returns the number of entries removed.
    fn remove_by_page_id(&mut self, page_id: i64) -> Result<usize>;
    fn list_all(&self) -> Result<Vec<FileMapping>>;

    fn list_for_repository(&self, repository_root: &str) -> Result<Vec<FileMapping>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|entry| entry.repository_root == repository_root)
            .collect())
    }
}

pub struct SqliteLedger {
    connection: Connection,
}

impl SqliteLedger {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::from_connection(connect(db_path)?)
    }

    /// Apply pending migrations to the database at `db_path` and report what ran.
    pub fn migrate(db_path: &Path) -> Result<MigrateReport> {
        let connection = connect(db_path)?;
        run_migrations(&connection)
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory ledger")?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        run_migrations(&connection)?;
        Ok(Self { connection })
    }
}

impl MappingLedger for SqliteLedger {
    fn get(&self, file_path: &str) -> Result<Option<FileMapping>> {
        self.connection
            .query_row(
                "SELECT file_path, page_id, relationship, last_synced_at_unix, content_hash, repository_root
                 FROM file_mappings WHERE file_path = ?1",
                [file_path],
                decode_row,
            )
            .optional()
            .with_context(|| format!("failed to read mapping for {file_path}"))
    }

    fn put(&mut self, entry: &FileMapping) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO file_mappings (
                    file_path, page_id, relationship, last_synced_at_unix, content_hash, repository_root
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(file_path) DO UPDATE SET
                    page_id = excluded.page_id,
                    relationship = excluded.relationship,
                    last_synced_at_unix = excluded.last_synced_at_unix,
                    content_hash = excluded.content_hash,
                    repository_root = excluded.repository_root",
                params![
                    entry.file_path,
                    entry.page_id,
                    entry.relationship,
                    entry.last_synced_at_unix,
                    entry.content_hash,
                    entry.repository_root,
                ],
            )
            .with_context(|| format!("failed to upsert mapping for {}", entry.file_path))?;
        Ok(())
    }

    fn remove(&mut self, file_path: &str) -> Result<bool> {
        let deleted = self
            .connection
            .execute("DELETE FROM file_mappings WHERE file_path = ?1", [file_path])
            .with_context(|| format!("failed to delete mapping for {file_path}"))?;
        Ok(deleted > 0)
    }

    fn remove_by_page_id(&mut self, page_id: i64) -> Result<usize> {
        self.connection
            .execute("DELETE FROM file_mappings WHERE page_id = ?1", [page_id])
            .with_context(|| format!("failed to delete mappings for page {page_id}"))
    }

    fn list_all(&self) -> Result<Vec<FileMapping>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT file_path, page_id, relationship, last_synced_at_unix, content_hash, repository_root
                 FROM file_mappings ORDER BY file_path",
            )
            .context("failed to prepare mapping query")?;
        let rows = statement
            .query_map([], decode_row)
            .context("failed to run mapping query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode mapping row")?);
        }
        Ok(out)
    }

    fn list_for_repository(&self, repository_root: &str) -> Result<Vec<FileMapping>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT file_path, page_id, relationship, last_synced_at_unix, content_hash, repository_root
                 FROM file_mappings WHERE repository_root = ?1 ORDER BY file_path",
            )
            .context("failed to prepare repository mapping query")?;
        let rows = statement
            .query_map([repository_root], decode_row)
            .context("failed to run repository mapping query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode mapping row")?);
        }
        Ok(out)
    }
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<FileMapping> {
    Ok(FileMapping {
        file_path: row.get(0)?,
        page_id: row.get(1)?,
        relationship: row.get(2)?,
        last_synced_at_unix: row.get(3)?,
        content_hash: row.get(4)?,
        repository_root: row.get(5)?,
    })
}

fn connect(db_path: &Path) -> Result<Connection> {
    ensure_parent_dir(db_path)?;
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("db path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create database parent directory {}",
            parent.display()
        )
    })
}
