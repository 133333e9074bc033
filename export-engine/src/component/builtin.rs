//! Collaborators shipped with the engine.

use crate::component::{Backupable, Component, Snapshotable, StagingContext};
use crate::models::InstanceRecord;
use async_trait::async_trait;
use std::path::PathBuf;

/// Backs up the deployment's core configuration files.
///
/// Files that do not exist are reported and skipped.
#[derive(Debug, Clone)]
pub struct ConfigFiles {
    files: Vec<PathBuf>,
}

impl ConfigFiles {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }
}

impl Component for ConfigFiles {
    fn name(&self) -> &str {
        "config"
    }
}

#[async_trait]
impl Backupable for ConfigFiles {
    fn backup_name(&self) -> &str {
        "config"
    }

    async fn backup(&self, context: &StagingContext) -> crate::Result<()> {
        context.add_directory("").await?;

        for file in &self.files {
            let Some(name) = file.file_name() else {
                context.progress().line(format!("skipping {}: not a file", file.display()));
                continue;
            };
            if !tokio::fs::try_exists(file).await? {
                context.progress().line(format!("skipping {}: does not exist", file.display()));
                continue;
            }
            context.copy_file(name, file).await?;
        }
        Ok(())
    }
}

/// Copies the instance's base directory. Runs with the instance stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filesystem;

impl Component for Filesystem {
    fn name(&self) -> &str {
        "filesystem"
    }
}

#[async_trait]
impl Snapshotable for Filesystem {
    fn snapshot_needs_running(&self) -> bool {
        false
    }

    fn snapshot_name(&self) -> &str {
        "filesystem"
    }

    async fn snapshot(&self, instance: &InstanceRecord, context: &StagingContext) -> crate::Result<()> {
        context.copy_directory("", &instance.filesystem_base).await
    }
}

/// Stores the instance's own database record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bookkeeping;

impl Component for Bookkeeping {
    fn name(&self) -> &str {
        "bookkeeping"
    }
}

#[async_trait]
impl Snapshotable for Bookkeeping {
    fn snapshot_needs_running(&self) -> bool {
        true
    }

    fn snapshot_name(&self) -> &str {
        "bookkeeping.json"
    }

    async fn snapshot(&self, instance: &InstanceRecord, context: &StagingContext) -> crate::Result<()> {
        let json = serde_json::to_vec_pretty(instance)?;
        context.add_file("", json).await
    }
}
