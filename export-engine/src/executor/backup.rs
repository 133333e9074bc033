//! Fleet-wide exports.

use crate::component::StagingContext;
use crate::executor::fanout::FanOut;
use crate::executor::manifest::Manifest;
use crate::executor::progress::Progress;
use crate::executor::snapshot::{Snapshot, SnapshotDescription};
use crate::executor::Exporter;
use crate::utils::errors::ExportError;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory below a backup holding one snapshot per instance.
const INSTANCES_DIR: &str = "instances";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupDescription {
    /// Directory the backup is written into
    pub dest: PathBuf,

    /// Snapshots taken in parallel; 0 means unbounded
    #[serde(default)]
    pub concurrent_snapshots: usize,
}

/// Result of a backup run.
#[derive(Debug)]
pub struct Backup {
    pub description: BackupDescription,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    pub err_panic: Option<ExportError>,

    /// Outcome of every core component, keyed by backup name like its
    /// staging directory and progress label
    pub component_errors: BTreeMap<String, Option<ExportError>>,

    /// Listing the instances failed, so no snapshots were taken
    pub instance_list_err: Option<ExportError>,

    /// One snapshot per instance, sorted by slug
    pub instance_snapshots: Vec<Snapshot>,

    /// Sorted paths written, relative to `description.dest`
    pub manifest: Vec<String>,
}

impl Backup {
    fn new(description: BackupDescription) -> Self {
        let now = Utc::now();
        Self {
            description,
            start_time: now,
            end_time: now,
            err_panic: None,
            component_errors: BTreeMap::new(),
            instance_list_err: None,
            instance_snapshots: Vec::new(),
            manifest: Vec::new(),
        }
    }
}

impl Exporter {
    /// Back up the core components and snapshot every instance into
    /// `description.dest`.
    ///
    /// Never fails: every error is recorded in the returned [`Backup`].
    pub async fn new_backup(&self, progress: &Progress, description: BackupDescription) -> Backup {
        let mut backup = Backup::new(description);
        let manifest = Manifest::new();

        let run = AssertUnwindSafe(self.run_backup(&mut backup, &manifest, progress));
        if let Err(payload) = run.catch_unwind().await {
            let err = ExportError::from_panic(payload);
            warn!(error = %err, "Backup panicked");
            backup.err_panic = Some(err);
        }

        backup.manifest = manifest.sorted();
        backup.end_time = Utc::now();
        backup
    }

    async fn run_backup(&self, backup: &mut Backup, manifest: &Manifest, progress: &Progress) {
        let dest = backup.description.dest.clone();

        progress.line("Backing up core components");
        backup.component_errors = self.backup_components(&dest, manifest).await;

        progress.line("Creating instance snapshots");
        let instances = match self.instances.all().await {
            Ok(instances) => instances,
            Err(err) => {
                warn!(error = %err, "Unable to list instances");
                progress.line(&err);
                backup.instance_list_err = Some(err);
                return;
            }
        };

        let base = dest.join(INSTANCES_DIR);
        if let Err(err) = tokio::fs::create_dir_all(&base).await {
            backup.instance_list_err = Some(err.into());
            return;
        }
        manifest.add(INSTANCES_DIR);

        info!(
            instances = instances.len(),
            concurrent = backup.description.concurrent_snapshots,
            "Creating instance snapshots"
        );

        let records = instances.clone();
        let exporter = self.clone();
        let outcomes = FanOut::new("snapshot")
            .limit(backup.description.concurrent_snapshots)
            .run(instances, |i| i.slug.clone(), {
                let base = base.clone();
                move |instance, progress| {
                    let exporter = exporter.clone();
                    let description = SnapshotDescription {
                        dest: base.join(&instance.slug),
                        ..SnapshotDescription::default()
                    };
                    async move { exporter.new_snapshot(instance, &progress, description).await }
                }
            })
            .await;

        let mut snapshots: Vec<Snapshot> = records
            .into_iter()
            .zip(outcomes)
            .map(|(record, outcome)| match outcome.result {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    let description = SnapshotDescription {
                        dest: base.join(&record.slug),
                        ..SnapshotDescription::default()
                    };
                    Snapshot::failed(description, record, err)
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.instance.slug.cmp(&b.instance.slug));

        for snapshot in &snapshots {
            let prefix = Path::new(INSTANCES_DIR).join(&snapshot.instance.slug);
            manifest.add(&prefix);
            manifest.extend(
                snapshot
                    .manifest
                    .iter()
                    .map(|path| prefix.join(path).to_string_lossy().into_owned()),
            );
        }
        backup.instance_snapshots = snapshots;
    }

    async fn backup_components(&self, dest: &Path, manifest: &Manifest) -> BTreeMap<String, Option<ExportError>> {
        let components = self.registry.backupable();
        let names: Vec<String> = components.iter().map(|c| c.backup_name().to_string()).collect();
        let dest = dest.to_path_buf();
        let manifest = manifest.clone();

        let outcomes = FanOut::new("backup")
            .run(
                components,
                |c| c.backup_name().to_string(),
                move |component, progress| {
                    let context = StagingContext::new(
                        progress,
                        &dest,
                        dest.join(component.backup_name()),
                        manifest.clone(),
                    );
                    async move { component.backup(&context).await }
                },
            )
            .await;

        names
            .into_iter()
            .zip(outcomes)
            .map(|(name, outcome)| (name, outcome.flatten().err()))
            .collect()
    }
}
