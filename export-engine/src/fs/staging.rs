//! Allocation of staging directories and archive paths.
//!
//! Layout below the deployment root:
//!
//! ```text
//! <root>/snapshots/staging/<name>           transient working directories
//! <root>/snapshots/archives/<name>.tar.gz   packaged exports
//! ```

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const SUFFIX_LEN: usize = 10;

/// Extension of packaged exports.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

#[derive(Debug, Clone)]
pub struct StagingArea {
    base: PathBuf,
}

impl StagingArea {
    /// Staging area for the deployment rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            base: root.as_ref().join("snapshots"),
        }
    }

    pub fn staging_path(&self) -> PathBuf {
        self.base.join("staging")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.base.join("archives")
    }

    /// Create a fresh staging directory. An empty prefix names a fleet backup,
    /// otherwise the prefix is the instance slug.
    ///
    /// The returned directory did not exist before this call.
    pub async fn new_staging_dir(&self, prefix: &str) -> crate::Result<PathBuf> {
        let parent = self.staging_path();
        fs::create_dir_all(&parent).await?;

        loop {
            let path = parent.join(new_name(prefix));
            match fs::create_dir(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Created staging directory");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Pick a path for a new archive that does not exist yet.
    ///
    /// The path is only probed, not created: two processes racing for the
    /// same name is not guarded against.
    pub async fn new_archive_path(&self, prefix: &str) -> crate::Result<PathBuf> {
        let parent = self.archive_path();
        fs::create_dir_all(&parent).await?;

        loop {
            let path = parent.join(format!("{}.{}", new_name(prefix), ARCHIVE_EXTENSION));
            if !fs::try_exists(&path).await? {
                return Ok(path);
            }
        }
    }
}

/// `backup-<unix>-<suffix>` or `snapshot-<prefix>-<unix>-<suffix>`.
fn new_name(prefix: &str) -> String {
    let kind = if prefix.is_empty() {
        "backup".to_string()
    } else {
        format!("snapshot-{prefix}")
    };
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{kind}-{}-{suffix}", chrono::Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_name_format() {
        let name = new_name("");
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "backup");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));

        assert!(new_name("wiki").starts_with("snapshot-wiki-"));
    }

    #[tokio::test]
    async fn test_staging_dirs_are_fresh() -> crate::Result<()> {
        let root = TempDir::new()?;
        let area = StagingArea::new(root.path());

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let dir = area.new_staging_dir("wiki").await?;
            assert!(dir.is_dir());
            assert!(dir.starts_with(root.path().join("snapshots/staging")));
            assert!(seen.insert(dir));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_paths_do_not_exist() -> crate::Result<()> {
        let root = TempDir::new()?;
        let area = StagingArea::new(root.path());

        for _ in 0..20 {
            let path = area.new_archive_path("").await?;
            assert!(!path.exists());
            assert!(path.to_string_lossy().ends_with(".tar.gz"));
            std::fs::write(&path, b"taken")?;
        }
        Ok(())
    }
}
