//! Per-instance exports.

use crate::component::{Snapshotable, StagingContext};
use crate::executor::fanout::FanOut;
use crate::executor::manifest::Manifest;
use crate::executor::progress::Progress;
use crate::executor::Exporter;
use crate::instance::LockGuard;
use crate::models::InstanceRecord;
use crate::utils::errors::ExportError;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDescription {
    /// Directory the snapshot is written into
    pub dest: PathBuf,

    /// Keep the instance running while whitebox parts are exported
    #[serde(default)]
    pub keepalive: bool,

    /// Parts to include; empty means all of them
    #[serde(default)]
    pub parts: Vec<String>,
}

/// Result of a snapshot run.
#[derive(Debug)]
pub struct Snapshot {
    pub description: SnapshotDescription,
    pub instance: InstanceRecord,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Fault that ended the run early, including a failure to take the lock
    pub err_panic: Option<ExportError>,
    pub err_stop: Option<ExportError>,
    pub err_start: Option<ExportError>,

    pub whitebox_errors: BTreeMap<String, Option<ExportError>>,
    pub blackbox_errors: BTreeMap<String, Option<ExportError>>,

    /// Progress output of every part
    pub logs: BTreeMap<String, String>,

    /// Sorted paths written, relative to `description.dest`
    pub manifest: Vec<String>,
}

impl Snapshot {
    fn new(description: SnapshotDescription, instance: InstanceRecord) -> Self {
        let now = Utc::now();
        Self {
            description,
            instance,
            start_time: now,
            end_time: now,
            err_panic: None,
            err_stop: None,
            err_start: None,
            whitebox_errors: BTreeMap::new(),
            blackbox_errors: BTreeMap::new(),
            logs: BTreeMap::new(),
            manifest: Vec::new(),
        }
    }

    /// Snapshot that never ran because of `err`.
    pub(crate) fn failed(description: SnapshotDescription, instance: InstanceRecord, err: ExportError) -> Self {
        let mut snapshot = Self::new(description, instance);
        snapshot.err_panic = Some(err);
        snapshot
    }

    fn finish(mut self, manifest: &Manifest) -> Self {
        self.manifest = manifest.sorted();
        self.end_time = Utc::now();
        self
    }

    /// True when neither the run nor any part reported an error.
    pub fn is_ok(&self) -> bool {
        self.err_panic.is_none()
            && self.err_stop.is_none()
            && self.err_start.is_none()
            && self
                .whitebox_errors
                .values()
                .chain(self.blackbox_errors.values())
                .all(Option::is_none)
    }
}

type PartOutcome = (String, Option<ExportError>, String);

impl Exporter {
    /// Take a snapshot of `instance` into `description.dest`.
    ///
    /// Never fails: every error, including a panic of the run itself, is
    /// recorded in the returned [`Snapshot`].
    pub async fn new_snapshot(
        &self,
        instance: InstanceRecord,
        progress: &Progress,
        mut description: SnapshotDescription,
    ) -> Snapshot {
        let parts = self.select_parts(&mut description);
        let mut snapshot = Snapshot::new(description, instance);
        let manifest = Manifest::new();
        let slug = snapshot.instance.slug.clone();

        progress.line("Locking instance");
        let locked = AssertUnwindSafe(LockGuard::acquire(Arc::clone(&self.locker), &slug))
            .catch_unwind()
            .await;
        let guard = match locked {
            Ok(Ok(guard)) => guard,
            Ok(Err(err)) => {
                warn!(slug = %slug, error = %err, "Unable to lock instance");
                progress.line(&err);
                snapshot.err_panic = Some(err);
                return snapshot.finish(&manifest);
            }
            Err(payload) => {
                snapshot.err_panic = Some(ExportError::from_panic(payload));
                return snapshot.finish(&manifest);
            }
        };

        let run = AssertUnwindSafe(self.run_snapshot(&mut snapshot, parts, &manifest, progress));
        if let Err(payload) = run.catch_unwind().await {
            let err = ExportError::from_panic(payload);
            warn!(slug = %slug, error = %err, "Snapshot panicked");
            snapshot.err_panic = Some(err);
        }

        // The lock is released before returning, whatever happened above.
        progress.line("Unlocking instance");
        if let Err(err) = guard.release().await {
            warn!(slug = %slug, error = %err, "Failed to unlock instance");
        }

        snapshot.finish(&manifest)
    }

    /// Names of all parts a snapshot can include, sorted.
    pub fn parts(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .snapshotable()
            .iter()
            .map(|p| p.snapshot_name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Resolve the requested parts and write the resolved list back.
    fn select_parts(&self, description: &mut SnapshotDescription) -> Vec<Arc<dyn Snapshotable>> {
        let available = self.registry.snapshotable();

        let selected: Vec<_> = if description.parts.is_empty() {
            available
        } else {
            let wanted: BTreeSet<&str> = description.parts.iter().map(String::as_str).collect();
            for name in &wanted {
                if !available.iter().any(|p| p.snapshot_name() == *name) {
                    warn!(part = %name, "Unknown snapshot part, ignoring");
                }
            }
            available
                .into_iter()
                .filter(|p| wanted.contains(p.snapshot_name()))
                .collect()
        };

        let mut names: Vec<String> = selected.iter().map(|p| p.snapshot_name().to_string()).collect();
        names.sort();
        description.parts = names;
        selected
    }

    /// Runs with the instance lock held.
    async fn run_snapshot(
        &self,
        snapshot: &mut Snapshot,
        parts: Vec<Arc<dyn Snapshotable>>,
        manifest: &Manifest,
        progress: &Progress,
    ) {
        if let Err(err) = tokio::fs::create_dir_all(&snapshot.description.dest).await {
            snapshot.err_panic = Some(err.into());
            return;
        }

        let (blackbox, whitebox): (Vec<_>, Vec<_>) = parts.into_iter().partition(|p| p.snapshot_needs_running());

        info!(
            slug = %snapshot.instance.slug,
            whitebox = whitebox.len(),
            blackbox = blackbox.len(),
            keepalive = snapshot.description.keepalive,
            "Running snapshot parts"
        );

        self.run_whitebox(snapshot, whitebox, manifest, progress).await;

        let dest = snapshot.description.dest.clone();
        let outcomes = run_parts(&snapshot.instance, blackbox, &dest, manifest).await;
        record(&mut snapshot.blackbox_errors, &mut snapshot.logs, outcomes);
    }

    /// Run the parts that need the instance stopped. Unless keepalive is set
    /// the stack is brought down first and always brought up again afterwards.
    async fn run_whitebox(
        &self,
        snapshot: &mut Snapshot,
        parts: Vec<Arc<dyn Snapshotable>>,
        manifest: &Manifest,
        progress: &Progress,
    ) {
        let stop = !snapshot.description.keepalive;
        let instance = snapshot.instance.clone();
        let dest = snapshot.description.dest.clone();

        let result = AssertUnwindSafe(async {
            let err_stop = if stop {
                progress.line("Stopping instance");
                self.stack.down(&instance, progress).await.err()
            } else {
                None
            };
            let outcomes = run_parts(&instance, parts, &dest, manifest).await;
            (err_stop, outcomes)
        })
        .catch_unwind()
        .await;

        if stop {
            progress.line("Starting instance");
            snapshot.err_start = self.stack.up(&instance, progress).await.err();
        }

        match result {
            Ok((err_stop, outcomes)) => {
                snapshot.err_stop = err_stop;
                record(&mut snapshot.whitebox_errors, &mut snapshot.logs, outcomes);
            }
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

async fn run_parts(
    instance: &InstanceRecord,
    parts: Vec<Arc<dyn Snapshotable>>,
    dest: &Path,
    manifest: &Manifest,
) -> Vec<PartOutcome> {
    let names: Vec<String> = parts.iter().map(|p| p.snapshot_name().to_string()).collect();
    let instance = Arc::new(instance.clone());
    let dest = dest.to_path_buf();
    let manifest = manifest.clone();

    let outcomes = FanOut::new("snapshot")
        .run(
            parts,
            |part| part.snapshot_name().to_string(),
            move |part, progress| {
                let (instance, dest, manifest) = (Arc::clone(&instance), dest.clone(), manifest.clone());
                async move {
                    let context = StagingContext::new(progress, &dest, dest.join(part.snapshot_name()), manifest);
                    part.snapshot(&instance, &context).await
                }
            },
        )
        .await;

    names
        .into_iter()
        .zip(outcomes)
        .map(|(name, outcome)| {
            let log = outcome.log.clone();
            (name, outcome.flatten().err(), log)
        })
        .collect()
}

fn record(
    errors: &mut BTreeMap<String, Option<ExportError>>,
    logs: &mut BTreeMap<String, String>,
    outcomes: Vec<PartOutcome>,
) {
    for (name, err, log) in outcomes {
        errors.insert(name.clone(), err);
        logs.insert(name, log);
    }
}
