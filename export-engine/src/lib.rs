//! Export engine for a WissKI distillery.
//!
//! Produces fleet-wide backups and per-instance snapshots, packages them into
//! archives, keeps a ledger of what exists on disk and prunes old archives.

pub mod component;
pub mod config;
pub mod db;
pub mod executor;
pub mod fs;
pub mod instance;
pub mod models;
pub mod utils;

// Re-export commonly used types
pub use component::{Backupable, Component, Registry, Snapshotable, StagingContext};
pub use config::ExportConfig;
pub use executor::backup::{Backup, BackupDescription};
pub use executor::progress::Progress;
pub use executor::snapshot::{Snapshot, SnapshotDescription};
pub use executor::task::ExportTask;
pub use executor::{Collaborators, Exporter};
pub use instance::{InstanceLocker, InstanceSource, Stack};
pub use models::{ExportLogEntry, InstanceRecord};
pub use utils::errors::{ExportError, Result};
