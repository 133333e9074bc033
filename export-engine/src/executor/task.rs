//! The export orchestrator: staging, running, reporting, packaging and
//! recording a single backup or snapshot.

use crate::executor::backup::BackupDescription;
use crate::executor::progress::Progress;
use crate::executor::report::ExportReport;
use crate::executor::snapshot::SnapshotDescription;
use crate::executor::Exporter;
use crate::fs::archive::package;
use crate::models::{ExportLogEntry, InstanceRecord};
use crate::utils::errors::ExportError;
use crate::utils::format::{format_bytes, format_duration};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Plain-text report written into every staging directory.
pub const REPORT_PLAIN: &str = "report.txt";

/// JSON report written into every staging directory.
pub const REPORT_MACHINE: &str = "report.json";

#[derive(Debug, Clone, Default)]
pub struct ExportTask {
    /// Staging directory when `staging_only` is set, archive path otherwise.
    /// Generated when empty.
    pub dest: Option<PathBuf>,

    /// Keep the staging directory instead of packaging it
    pub staging_only: bool,

    /// Instance to snapshot; a fleet backup is made when empty
    pub instance: Option<InstanceRecord>,

    pub backup: BackupDescription,
    pub snapshot: SnapshotDescription,
}

/// Removes a staging directory.
///
/// Call [`StagingCleanup::remove`] once the export is done. Dropping the
/// guard without it (a panic or a cancelled future) removes the directory
/// synchronously instead.
struct StagingCleanup {
    path: PathBuf,
    progress: Progress,
    removed: bool,
}

impl StagingCleanup {
    fn new(path: PathBuf, progress: Progress) -> Self {
        Self {
            path,
            progress,
            removed: false,
        }
    }

    async fn remove(mut self) {
        self.removed = true;
        self.progress.line("Removing staging directory");
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory");
        }
    }
}

impl Drop for StagingCleanup {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.progress.line("Removing staging directory");
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory");
        }
    }
}

impl Exporter {
    /// Run `task` and record the result in the export log.
    ///
    /// Failures of individual components only show up in the report; errors
    /// returned here come from staging, packaging or the ledger.
    pub async fn make_export(&self, progress: &Progress, task: ExportTask) -> crate::Result<ExportLogEntry> {
        let started = Instant::now();
        let ExportTask {
            dest,
            staging_only,
            instance,
            mut backup,
            mut snapshot,
        } = task;

        let slug = instance.as_ref().map(|i| i.slug.clone()).unwrap_or_default();
        let title = if instance.is_some() { "Snapshot" } else { "Backup" };

        progress.line("Determining target paths");
        let (staging_dir, supplied, archive_path) = if staging_only {
            match dest {
                Some(dest) => (dest, true, None),
                None => (self.staging.new_staging_dir(&slug).await?, false, None),
            }
        } else {
            let archive = match dest {
                Some(dest) => dest,
                None => self.staging.new_archive_path(&slug).await?,
            };
            (self.staging.new_staging_dir(&slug).await?, false, Some(archive))
        };
        progress.line(format!("Staging Directory: {}", staging_dir.display()));
        if let Some(archive) = &archive_path {
            progress.line(format!("Archive Path:      {}", archive.display()));
        }

        progress.line("Creating staging directory");
        if supplied {
            tokio::fs::create_dir_all(&staging_dir).await?;
        }

        let cleanup = archive_path
            .is_some()
            .then(|| StagingCleanup::new(staging_dir.clone(), progress.clone()));

        let result = async {
            progress.line(format!("Generating {title}"));
            let report: Box<dyn ExportReport + Send> = match instance {
                None => {
                    backup.dest = staging_dir.clone();
                    Box::new(self.new_backup(progress, backup).await)
                }
                Some(instance) => {
                    snapshot.dest = staging_dir.clone();
                    Box::new(self.new_snapshot(instance, progress, snapshot).await)
                }
            };
            write_reports(&staging_dir, report.as_ref(), progress).await?;

            let mut entry = ExportLogEntry::new(report.slug(), report.start_time());

            let Some(archive_path) = archive_path else {
                progress.line("Writing Log Entry");
                entry.path = staging_dir;
                entry.packed = false;
                let entry = self.log.add(entry).await?;
                progress.line(format!("Wrote {}", entry.path.display()));
                info!(slug = %slug, elapsed = %format_duration(started.elapsed().as_secs()), "Export complete");
                return Ok::<_, ExportError>(entry);
            };

            progress.line("Writing archive");
            let bytes = tokio::task::spawn_blocking({
                let (archive, staging, progress) = (archive_path.clone(), staging_dir.clone(), progress.clone());
                move || package(&archive, &staging, |rel, _| progress.line(rel.display()))
            })
            .await??;
            progress.line(format!("Wrote {} to {}", format_bytes(bytes), archive_path.display()));

            progress.line("Writing Log Entry");
            entry.path = archive_path;
            entry.packed = true;
            let entry = self.log.add(entry).await?;

            info!(
                slug = %slug,
                path = %entry.path.display(),
                elapsed = %format_duration(started.elapsed().as_secs()),
                "Export complete"
            );
            Ok::<_, ExportError>(entry)
        }
        .await;

        if let Some(cleanup) = cleanup {
            cleanup.remove().await;
        }
        result
    }
}

async fn write_reports(dir: &Path, report: &(dyn ExportReport + Send), progress: &Progress) -> crate::Result<()> {
    let mut machine = Vec::new();
    report.report_machine(&mut machine)?;
    let path = dir.join(REPORT_MACHINE);
    progress.line(path.display());
    tokio::fs::write(&path, machine).await?;

    let mut plain = Vec::new();
    report.report_plain(&mut plain)?;
    let path = dir.join(REPORT_PLAIN);
    progress.line(path.display());
    tokio::fs::write(&path, plain).await?;

    Ok(())
}
