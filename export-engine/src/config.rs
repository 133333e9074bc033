//! Configuration for the export engine.
//!
//! Loaded from a TOML file; every section falls back to its defaults when
//! omitted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub paths: PathsConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Core configuration files copied into every backup
    #[serde(default)]
    pub config_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Deployment root; exports live under `<root>/snapshots`
    pub root: PathBuf,

    /// SQLite database holding the export ledger
    #[serde(default)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Archives older than this many days are removed by a prune
    #[serde(default = "default_max_backup_age_days")]
    pub max_backup_age_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Snapshots taken in parallel during a backup (0 = unbounded)
    #[serde(default = "default_concurrent_snapshots")]
    pub concurrent_snapshots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_backup_age_days() -> u64 {
    30
}

fn default_concurrent_snapshots() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_backup_age_days: default_max_backup_age_days(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            concurrent_snapshots: default_concurrent_snapshots(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::with_root("/var/www/deploy")
    }
}

impl ExportConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ExportConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration rooted at the given deployment directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        ExportConfig {
            paths: PathsConfig {
                root: root.into(),
                database: None,
            },
            retention: RetentionConfig::default(),
            backup: BackupConfig::default(),
            log: LogConfig::default(),
            config_files: Vec::new(),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.paths.root.as_os_str().is_empty() {
            return Err(crate::ExportError::Config(
                "paths.root must not be empty".to_string(),
            ));
        }
        if !self.paths.root.is_absolute() {
            return Err(crate::ExportError::Config(format!(
                "paths.root must be absolute, got {}",
                self.paths.root.display()
            )));
        }
        Ok(())
    }

    /// Path of the SQLite ledger database
    pub fn database_path(&self) -> PathBuf {
        self.paths
            .database
            .clone()
            .unwrap_or_else(|| self.paths.root.join("distillery.db"))
    }

    pub fn max_backup_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention.max_backup_age_days.saturating_mul(24 * 60 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: ExportConfig = toml::from_str(
            r#"
            [paths]
            root = "/srv/distillery"
            "#,
        )
        .unwrap();

        assert_eq!(config.retention.max_backup_age_days, 30);
        assert_eq!(config.backup.concurrent_snapshots, 2);
        assert_eq!(config.log.level, "info");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/srv/distillery/distillery.db")
        );
        assert!(config.config_files.is_empty());
    }

    #[test]
    fn test_from_file_rejects_relative_root() -> std::io::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("export.toml");
        std::fs::write(&path, "[paths]\nroot = \"relative/dir\"\n")?;

        let err = ExportConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, crate::ExportError::Config(_)));
        Ok(())
    }

    #[test]
    fn test_max_backup_age() {
        let mut config = ExportConfig::with_root("/srv");
        config.retention.max_backup_age_days = 2;
        assert_eq!(config.max_backup_age().as_secs(), 2 * 86_400);

        config.retention.max_backup_age_days = u64::MAX;
        assert_eq!(config.max_backup_age().as_secs(), u64::MAX);
    }
}
