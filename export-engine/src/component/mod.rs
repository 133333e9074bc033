//! Collaborator contracts and the registry that holds them.
//!
//! Subsystems take part in exports by implementing [`Backupable`] (fleet
//! backups) and/or [`Snapshotable`] (per-instance snapshots) and being
//! registered once at startup.

pub mod builtin;
pub mod staging;

use crate::models::InstanceRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use staging::StagingContext;

pub trait Component: Send + Sync {
    /// Unique name of this component
    fn name(&self) -> &str;
}

#[async_trait]
pub trait Backupable: Component {
    /// Name of the sub-directory this component writes its backup into
    fn backup_name(&self) -> &str;

    async fn backup(&self, context: &StagingContext) -> crate::Result<()>;
}

#[async_trait]
pub trait Snapshotable: Component {
    /// Whether the instance must be running while this part is exported.
    /// Parts that return false are run with the instance stopped.
    fn snapshot_needs_running(&self) -> bool;

    /// Name of the sub-directory this part writes into
    fn snapshot_name(&self) -> &str;

    async fn snapshot(&self, instance: &InstanceRecord, context: &StagingContext) -> crate::Result<()>;
}

#[derive(Clone, Default)]
struct Registered {
    backupable: Option<Arc<dyn Backupable>>,
    snapshotable: Option<Arc<dyn Snapshotable>>,
}

/// Components taking part in exports, keyed by [`Component::name`].
#[derive(Clone, Default)]
pub struct Registry {
    components: BTreeMap<String, Registered>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_backupable(&mut self, component: Arc<dyn Backupable>) -> &mut Self {
        let name = component.name().to_string();
        self.components.entry(name).or_default().backupable = Some(component);
        self
    }

    pub fn register_snapshotable(&mut self, component: Arc<dyn Snapshotable>) -> &mut Self {
        let name = component.name().to_string();
        self.components.entry(name).or_default().snapshotable = Some(component);
        self
    }

    /// Register a component that takes part in both backups and snapshots.
    pub fn register<C>(&mut self, component: Arc<C>) -> &mut Self
    where
        C: Backupable + Snapshotable + 'static,
    {
        self.register_backupable(component.clone());
        self.register_snapshotable(component)
    }

    /// All backupable components, ordered by name.
    pub fn backupable(&self) -> Vec<Arc<dyn Backupable>> {
        self.components
            .values()
            .filter_map(|c| c.backupable.clone())
            .collect()
    }

    /// All snapshotable components, ordered by name.
    pub fn snapshotable(&self) -> Vec<Arc<dyn Snapshotable>> {
        self.components
            .values()
            .filter_map(|c| c.snapshotable.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.components.keys()).finish()
    }
}
