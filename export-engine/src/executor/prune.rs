//! Removal of archives past their retention age.

use crate::executor::progress::Progress;
use crate::executor::Exporter;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::info;

impl Exporter {
    /// Whether a file last modified at `modified` is past the retention age.
    pub fn should_prune(&self, modified: SystemTime) -> bool {
        is_expired(modified, SystemTime::now(), self.config.max_backup_age())
    }

    /// Delete every archive older than the retention age, then re-read the
    /// export log so that it forgets the deleted files.
    ///
    /// Directories in the archive directory are left alone. The first file
    /// that cannot be inspected or removed aborts the prune.
    pub async fn prune_exports(&self, progress: &Progress) -> crate::Result<Vec<PathBuf>> {
        let dir = self.staging.archive_path();
        let days = self.config.retention.max_backup_age_days;
        let mut removed = Vec::new();

        match fs::read_dir(&dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let metadata = entry.metadata().await?;
                    if metadata.is_dir() || !self.should_prune(metadata.modified()?) {
                        continue;
                    }

                    let path = entry.path();
                    progress.line(format!(
                        "Removing {} cause it is older than {} days",
                        path.display(),
                        days
                    ));
                    fs::remove_file(&path).await?;
                    removed.push(path);
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %dir.display(), "Archive directory does not exist, nothing to prune");
            }
            Err(e) => return Err(e.into()),
        }

        info!(removed = removed.len(), max_age_days = days, "Pruned old exports");

        self.log.log().await?;
        Ok(removed)
    }
}

fn is_expired(modified: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    // Timestamps in the future are never expired.
    now.duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::Fixture;
    use crate::models::ExportLogEntry;
    use std::fs::File;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_is_expired() {
        let now = SystemTime::now();
        assert!(is_expired(now - 31 * DAY, now, 30 * DAY));
        assert!(!is_expired(now - 29 * DAY, now, 30 * DAY));
        assert!(!is_expired(now + DAY, now, 30 * DAY));
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_archives() -> crate::Result<()> {
        let fixture = Fixture::new();
        let exporter = fixture.exporter();
        let archives = exporter.staging.archive_path();
        std::fs::create_dir_all(archives.join("keep-this-dir"))?;

        let old = archives.join("backup-1-old.tar.gz");
        let new = archives.join("backup-2-new.tar.gz");
        File::create(&old)?.set_modified(SystemTime::now() - 40 * DAY)?;
        File::create(&new)?;

        for path in [&old, &new] {
            let mut entry = ExportLogEntry::new("", chrono::Utc::now());
            entry.path = path.clone();
            entry.packed = true;
            exporter.log.add(entry).await?;
        }

        let progress = Progress::new("prune");
        let removed = exporter.prune_exports(&progress).await?;

        assert_eq!(removed, vec![old.clone()]);
        assert!(!old.exists());
        assert!(new.exists());
        assert!(archives.join("keep-this-dir").is_dir());
        assert!(progress.contents().contains("cause it is older than 30 days"));

        let remaining = exporter.log.log().await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, new);
        Ok(())
    }

    #[tokio::test]
    async fn test_prune_without_archive_directory() -> crate::Result<()> {
        let fixture = Fixture::new();
        let exporter = fixture.exporter();
        let removed = exporter.prune_exports(&Progress::new("prune")).await?;
        assert!(removed.is_empty());
        Ok(())
    }
}
