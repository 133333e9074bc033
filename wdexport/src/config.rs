use export_engine::ExportConfig;
use std::path::{Path, PathBuf};

/// Load the export configuration and apply environment overrides.
///
/// Reads `.env` first, so overrides can live there as well.
pub fn load(path: Option<&Path>) -> anyhow::Result<ExportConfig> {
    let _ = dotenvy::dotenv();

    let mut config = match path {
        Some(path) => ExportConfig::from_file(path)?,
        None => ExportConfig::default(),
    };
    apply_env(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn apply_env(config: &mut ExportConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(root) = var("WDEXPORT_ROOT") {
        config.paths.root = PathBuf::from(root);
    }
    if let Some(days) = var("WDEXPORT_MAX_BACKUP_AGE").and_then(|v| v.parse().ok()) {
        config.retention.max_backup_age_days = days;
    }
    if let Some(n) = var("WDEXPORT_CONCURRENT_SNAPSHOTS").and_then(|v| v.parse().ok()) {
        config.backup.concurrent_snapshots = n;
    }
    if let Some(level) = var("LOG_LEVEL") {
        config.log.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WDEXPORT_ROOT", "/srv/distillery"),
            ("WDEXPORT_MAX_BACKUP_AGE", "7"),
            ("WDEXPORT_CONCURRENT_SNAPSHOTS", "not-a-number"),
            ("LOG_LEVEL", "debug"),
        ]);

        let mut config = ExportConfig::default();
        apply_env(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.paths.root, PathBuf::from("/srv/distillery"));
        assert_eq!(config.retention.max_backup_age_days, 7);
        assert_eq!(config.backup.concurrent_snapshots, 2);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("wdexport.toml");
        std::fs::write(
            &path,
            format!(
                "config_files = [\"/etc/distillery/.env\"]\n\n[paths]\nroot = \"{}\"\n\n[retention]\nmax_backup_age_days = 14\n",
                dir.path().display()
            ),
        )?;

        let config = ExportConfig::from_file(&path)?;
        assert_eq!(config.retention.max_backup_age_days, 14);
        assert_eq!(config.config_files, [PathBuf::from("/etc/distillery/.env")]);
        Ok(())
    }
}
