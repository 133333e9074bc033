//! Export engine: backups, snapshots and everything needed to stage,
//! package, record and prune them.

pub mod backup;
pub mod fanout;
pub mod ledger;
pub mod manifest;
pub mod progress;
pub mod prune;
pub mod report;
pub mod snapshot;
pub mod task;

use crate::component::Registry;
use crate::config::ExportConfig;
use crate::db::connection::DbPool;
use crate::fs::StagingArea;
use crate::instance::{InstanceLocker, InstanceSource, Stack};
use ledger::ExportLog;
use std::sync::Arc;

/// Handle to the export engine.
///
/// Cheap to clone; every clone shares the same collaborators.
#[derive(Clone)]
pub struct Exporter {
    config: Arc<ExportConfig>,
    staging: StagingArea,
    registry: Arc<Registry>,
    instances: Arc<dyn InstanceSource>,
    locker: Arc<dyn InstanceLocker>,
    stack: Arc<dyn Stack>,
    log: ExportLog,
}

/// External collaborators the engine drives.
pub struct Collaborators {
    pub registry: Registry,
    pub instances: Arc<dyn InstanceSource>,
    pub locker: Arc<dyn InstanceLocker>,
    pub stack: Arc<dyn Stack>,
}

impl Exporter {
    /// `pool` must point at a migrated database.
    pub fn new(config: ExportConfig, pool: DbPool, collaborators: Collaborators) -> Self {
        Self {
            staging: StagingArea::new(&config.paths.root),
            config: Arc::new(config),
            registry: Arc::new(collaborators.registry),
            instances: collaborators.instances,
            locker: collaborators.locker,
            stack: collaborators.stack,
            log: ExportLog::new(pool),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// The ledger of exports on disk.
    pub fn log(&self) -> &ExportLog {
        &self.log
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A fully wired [`Exporter`] backed by a temporary directory.

    use super::*;
    use crate::component::{Backupable, Component, Snapshotable, StagingContext};
    use crate::db::{connection::create_pool, migrate::migrate};
    use crate::instance::testing::{instance, CountingStack, MemoryLocker, PanickingInstances, StaticInstances};
    use crate::models::InstanceRecord;
    use crate::ExportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum Behavior {
        Write,
        Fail,
        Panic,
    }

    /// A collaborator that writes `<name>.txt`, fails or panics.
    pub struct Part {
        pub name: &'static str,
        pub needs_running: bool,
        pub behavior: Behavior,
        pub calls: AtomicUsize,
    }

    impl Part {
        pub fn new(name: &'static str, needs_running: bool, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                needs_running,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn run(&self, context: &StagingContext) -> crate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Write => context.add_file(format!("{}.txt", self.name), self.name).await,
                Behavior::Fail => Err(ExportError::component(self.name, "simulated failure")),
                Behavior::Panic => panic!("{} exploded", self.name),
            }
        }
    }

    impl Component for Part {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl Backupable for Part {
        fn backup_name(&self) -> &str {
            self.name
        }

        async fn backup(&self, context: &StagingContext) -> crate::Result<()> {
            self.run(context).await
        }
    }

    #[async_trait]
    impl Snapshotable for Part {
        fn snapshot_needs_running(&self) -> bool {
            self.needs_running
        }

        fn snapshot_name(&self) -> &str {
            self.name
        }

        async fn snapshot(&self, _instance: &InstanceRecord, context: &StagingContext) -> crate::Result<()> {
            self.run(context).await
        }
    }

    pub struct Fixture {
        pub dir: TempDir,
        pub registry: Registry,
        pub instances: Vec<InstanceRecord>,
        pub list_fails: bool,
        pub list_panics: bool,
        pub locker: Arc<MemoryLocker>,
        pub stack: Arc<CountingStack>,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                registry: Registry::new(),
                instances: vec![instance("alpha")],
                list_fails: false,
                list_panics: false,
                locker: Arc::new(MemoryLocker::default()),
                stack: Arc::new(CountingStack::default()),
            }
        }

        pub fn exporter(&self) -> Exporter {
            let config = ExportConfig::with_root(self.dir.path());
            let pool = create_pool(&config.database_path()).unwrap();
            migrate(&pool).unwrap();

            let instances: Arc<dyn InstanceSource> = if self.list_panics {
                Arc::new(PanickingInstances)
            } else if self.list_fails {
                Arc::new(StaticInstances(Err(ExportError::Config("database unavailable".into()))))
            } else {
                Arc::new(StaticInstances(Ok(self.instances.clone())))
            };

            Exporter::new(
                config,
                pool,
                Collaborators {
                    registry: self.registry.clone(),
                    instances,
                    locker: self.locker.clone(),
                    stack: self.stack.clone(),
                },
            )
        }
    }
}
