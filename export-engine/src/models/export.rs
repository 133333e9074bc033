use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A row of the export ledger.
///
/// An empty `slug` marks a fleet backup; otherwise it names the instance
/// the snapshot was taken of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLogEntry {
    pub pk: i64,
    pub slug: String,
    pub created: DateTime<Utc>,
    /// Staging directory or archive file
    pub path: PathBuf,
    /// Whether `path` is a packaged archive
    pub packed: bool,
}

impl ExportLogEntry {
    /// Entry that has not been written to the ledger yet.
    pub fn new(slug: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            pk: 0,
            slug: slug.into(),
            created,
            path: PathBuf::new(),
            packed: false,
        }
    }

    pub fn is_backup(&self) -> bool {
        self.slug.is_empty()
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<ExportLogEntry> {
    Ok(ExportLogEntry {
        pk: row.get("pk")?,
        slug: row.get("slug")?,
        created: row.get("created")?,
        path: PathBuf::from(row.get::<_, String>("path")?),
        packed: row.get("packed")?,
    })
}

pub fn find_all(conn: &Connection) -> crate::Result<Vec<ExportLogEntry>> {
    let mut stmt = conn.prepare("SELECT * FROM snapshot ORDER BY created DESC, pk DESC")?;
    let rows = stmt.query_map([], row_to_entry)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn create(conn: &Connection, entry: &ExportLogEntry) -> crate::Result<ExportLogEntry> {
    conn.execute(
        "INSERT INTO snapshot (slug, created, path, packed) VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.slug,
            entry.created,
            entry.path.to_string_lossy(),
            entry.packed
        ],
    )?;
    Ok(ExportLogEntry {
        pk: conn.last_insert_rowid(),
        ..entry.clone()
    })
}

pub fn delete_many(conn: &Connection, pks: &[i64]) -> crate::Result<usize> {
    if pks.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; pks.len()].join(", ");
    let sql = format!("DELETE FROM snapshot WHERE pk IN ({})", placeholders);
    let changes = conn.execute(&sql, params_from_iter(pks.iter()))?;
    Ok(changes)
}
