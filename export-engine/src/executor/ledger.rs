//! Ledger of produced exports.
//!
//! Rows are only trusted as long as their path exists: reading the log
//! drops every row whose staging directory or archive has disappeared.

use crate::db::connection::DbPool;
use crate::models::export::{self, ExportLogEntry};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ExportLog {
    pool: DbPool,
}

impl ExportLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a new export. Returns the entry with its assigned key.
    pub async fn add(&self, entry: ExportLogEntry) -> crate::Result<ExportLogEntry> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> crate::Result<ExportLogEntry> {
            let conn = pool.get()?;
            let entry = export::create(&conn, &entry)?;
            debug!(pk = entry.pk, slug = %entry.slug, path = %entry.path.display(), "Added export log entry");
            Ok(entry)
        })
        .await?
    }

    /// All exports still present on disk, newest first.
    ///
    /// Rows whose path no longer exists are deleted from the ledger.
    pub async fn log(&self) -> crate::Result<Vec<ExportLogEntry>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> crate::Result<Vec<ExportLogEntry>> {
            let conn = pool.get()?;
            let entries = export::find_all(&conn)?;

            let mut keep = Vec::with_capacity(entries.len());
            let mut gone = Vec::new();
            for entry in entries {
                match entry.path.try_exists() {
                    Ok(true) => keep.push(entry),
                    Ok(false) => gone.push(entry.pk),
                    Err(e) => {
                        warn!(path = %entry.path.display(), error = %e, "Unable to check export path, keeping entry");
                        keep.push(entry);
                    }
                }
            }

            if !gone.is_empty() {
                let removed = export::delete_many(&conn, &gone)?;
                info!(removed, "Pruned export log entries without files");
            }
            Ok(keep)
        })
        .await?
    }

    /// Exports of a single instance. The empty slug selects fleet backups.
    pub async fn for_slug(&self, slug: &str) -> crate::Result<Vec<ExportLogEntry>> {
        let mut entries = self.log().await?;
        entries.retain(|e| e.slug == slug);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connection::create_pool, migrate::migrate};
    use chrono::{Duration, Utc};
    use std::path::Path;
    use tempfile::TempDir;

    fn ledger(dir: &Path) -> ExportLog {
        let pool = create_pool(&dir.join("ledger.db")).unwrap();
        migrate(&pool).unwrap();
        ExportLog::new(pool)
    }

    fn entry(slug: &str, path: &Path, age_minutes: i64) -> ExportLogEntry {
        let mut entry = ExportLogEntry::new(slug, Utc::now() - Duration::minutes(age_minutes));
        entry.path = path.to_path_buf();
        entry.packed = true;
        entry
    }

    #[tokio::test]
    async fn test_add_and_log() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let log = ledger(dir.path());

        let archive = dir.path().join("backup.tar.gz");
        std::fs::write(&archive, b"x")?;

        let added = log.add(entry("", &archive, 0)).await?;
        assert!(added.pk > 0);

        let entries = log.log().await?;
        assert_eq!(entries, vec![added]);
        Ok(())
    }

    #[tokio::test]
    async fn test_log_prunes_missing_paths() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let log = ledger(dir.path());

        let present = dir.path().join("present.tar.gz");
        let staging = dir.path().join("staging-dir");
        std::fs::write(&present, b"x")?;
        std::fs::create_dir(&staging)?;

        let a = log.add(entry("", &present, 3)).await?;
        log.add(entry("wiki", &dir.path().join("gone.tar.gz"), 2)).await?;
        let c = log.add(entry("wiki", &staging, 1)).await?;

        let entries = log.log().await?;
        assert_eq!(entries, vec![c.clone(), a.clone()]);

        let conn = log.pool.get()?;
        assert_eq!(export::find_all(&conn)?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_for_slug_filters_exactly() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let log = ledger(dir.path());

        let path = dir.path().join("a");
        std::fs::write(&path, b"x")?;

        log.add(entry("", &path, 0)).await?;
        log.add(entry("wiki", &path, 0)).await?;
        log.add(entry("wiki2", &path, 0)).await?;

        let backups = log.for_slug("").await?;
        assert_eq!(backups.len(), 1);
        assert!(backups[0].is_backup());

        let wiki = log.for_slug("wiki").await?;
        assert_eq!(wiki.len(), 1);
        assert_eq!(wiki[0].slug, "wiki");
        Ok(())
    }
}
