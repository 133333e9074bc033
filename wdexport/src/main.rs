//! wdexport - backups and snapshots of a WissKI distillery.

mod config;
mod infra;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use export_engine::component::builtin::{Bookkeeping, ConfigFiles, Filesystem};
use export_engine::db::{connection::create_pool, migrate::migrate};
use export_engine::{
    utils, BackupDescription, Collaborators, ExportConfig, ExportTask, Exporter, Progress, Registry,
    SnapshotDescription,
};
use infra::{ComposeStack, SqlInstances, SqlLocker};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make a backup of the entire distillery
    Backup {
        /// Archive to write; a staging directory with --staging-only
        dest: Option<PathBuf>,

        /// Do not package into an archive, only create a staging directory
        #[arg(long)]
        staging_only: bool,

        /// Maximum number of concurrent snapshots
        #[arg(long)]
        concurrent_snapshots: Option<usize>,

        /// Prune old archives afterwards
        #[arg(long)]
        prune: bool,
    },

    /// Make a snapshot of a single instance
    Snapshot {
        /// Slug of the instance
        slug: Option<String>,

        /// Archive to write; a staging directory with --staging-only
        dest: Option<PathBuf>,

        /// Do not package into an archive, only create a staging directory
        #[arg(long)]
        staging_only: bool,

        /// Do not stop the instance while taking the snapshot
        #[arg(long)]
        keepalive: bool,

        /// Only include these parts (comma separated)
        #[arg(long, value_delimiter = ',')]
        parts: Vec<String>,

        /// List available parts and exit
        #[arg(long)]
        list_parts: bool,
    },

    /// List exports present on disk
    Log {
        /// Only show snapshots of this instance
        #[arg(long)]
        slug: Option<String>,
    },

    /// Remove archives older than the configured retention age
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = config::load(args.config.as_deref())?;
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting wdexport v{} (root: {})",
        env!("CARGO_PKG_VERSION"),
        config.paths.root.display()
    );

    std::fs::create_dir_all(&config.paths.root)
        .with_context(|| format!("creating {}", config.paths.root.display()))?;

    let pool = create_pool(&config.database_path())?;
    migrate(&pool)?;

    let instances = SqlInstances::new(pool.clone());
    let exporter = Exporter::new(
        config.clone(),
        pool.clone(),
        Collaborators {
            registry: registry(&config),
            instances: Arc::new(instances.clone()),
            locker: Arc::new(SqlLocker::new(pool)),
            stack: Arc::new(ComposeStack::default()),
        },
    );

    match args.command {
        Command::Backup {
            dest,
            staging_only,
            concurrent_snapshots,
            prune,
        } => {
            let progress = Progress::new("backup");
            let task = ExportTask {
                dest,
                staging_only,
                backup: BackupDescription {
                    concurrent_snapshots: concurrent_snapshots.unwrap_or(config.backup.concurrent_snapshots),
                    ..BackupDescription::default()
                },
                ..ExportTask::default()
            };
            let result = exporter.make_export(&progress, task).await;

            // Prune even if the backup failed.
            if prune {
                tracing::info!("Pruning old backups");
                if let Err(e) = exporter.prune_exports(&progress).await {
                    tracing::error!("Failed to prune backups: {}", e);
                }
            }

            let entry = result.context("failed to make a backup")?;
            println!("{}", entry.path.display());
        }

        Command::Snapshot {
            slug,
            dest,
            staging_only,
            keepalive,
            parts,
            list_parts,
        } => {
            if list_parts {
                for part in exporter.parts() {
                    println!("{part}");
                }
                return Ok(());
            }

            let Some(slug) = slug else {
                bail!("missing instance slug");
            };
            let Some(instance) = instances.find(&slug).await? else {
                bail!("instance {slug} does not exist");
            };

            let progress = Progress::new(format!("snapshot {slug}"));
            let task = ExportTask {
                dest,
                staging_only,
                instance: Some(instance),
                snapshot: SnapshotDescription {
                    keepalive,
                    parts,
                    ..SnapshotDescription::default()
                },
                ..ExportTask::default()
            };
            let entry = exporter
                .make_export(&progress, task)
                .await
                .context("failed to make a snapshot")?;
            println!("{}", entry.path.display());
        }

        Command::Log { slug } => {
            let entries = match slug {
                Some(slug) => exporter.log().for_slug(&slug).await?,
                None => exporter.log().log().await?,
            };
            for entry in entries {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }

        Command::Prune => {
            let removed = exporter.prune_exports(&Progress::new("prune")).await?;
            tracing::info!("Removed {} archive(s)", removed.len());
        }
    }

    Ok(())
}

/// Collaborators built into the binary.
fn registry(config: &ExportConfig) -> Registry {
    let mut registry = Registry::new();
    registry
        .register_backupable(Arc::new(ConfigFiles::new(config.config_files.clone())))
        .register_snapshotable(Arc::new(Filesystem))
        .register_snapshotable(Arc::new(Bookkeeping));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use export_engine::{Component, Snapshotable};

    #[test]
    fn test_parse_snapshot_args() {
        let args = Args::parse_from([
            "wdexport",
            "snapshot",
            "wiki",
            "/tmp/out",
            "--keepalive",
            "--parts",
            "filesystem,bookkeeping.json",
        ]);
        match args.command {
            Command::Snapshot {
                slug,
                dest,
                keepalive,
                parts,
                staging_only,
                list_parts,
            } => {
                assert_eq!(slug.as_deref(), Some("wiki"));
                assert_eq!(dest, Some(PathBuf::from("/tmp/out")));
                assert!(keepalive);
                assert!(!staging_only);
                assert!(!list_parts);
                assert_eq!(parts, ["filesystem", "bookkeeping.json"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_registry_parts() {
        let registry = registry(&ExportConfig::default());
        let backups: Vec<_> = registry.backupable().iter().map(|c| c.name().to_string()).collect();
        let snapshots: Vec<_> = registry
            .snapshotable()
            .iter()
            .map(|c| c.snapshot_name().to_string())
            .collect();
        assert_eq!(backups, ["config"]);
        assert_eq!(snapshots, ["bookkeeping.json", "filesystem"]);
    }
}
