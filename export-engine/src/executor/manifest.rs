//! Manifest of files written during one export run.
//!
//! Collaborators running in parallel append to the same manifest, so it is
//! backed by a concurrent set. Paths are only ever added.

use dashmap::DashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Arc<DashSet<String>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a written file or directory. Returns false if it was already recorded.
    pub fn add(&self, path: impl AsRef<Path>) -> bool {
        self.entries
            .insert(path.as_ref().to_string_lossy().into_owned())
    }

    /// Record every path of another manifest.
    pub fn extend<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            self.entries.insert(path.into());
        }
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries
            .contains(path.as_ref().to_string_lossy().as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All recorded paths in sorted order.
    pub fn sorted(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }
}
