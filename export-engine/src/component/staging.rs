//! The per-collaborator view of a staging directory.

use crate::executor::manifest::Manifest;
use crate::executor::progress::Progress;
use crate::fs::walker::{walk_directory, EntryKind};
use crate::utils::errors::ExportError;
use std::path::{Component as PathComponent, Path, PathBuf};
use tokio::fs;

/// Handed to a collaborator for the duration of one backup or snapshot call.
///
/// All paths passed to the helpers are relative to [`StagingContext::path`].
/// Every path created through a helper is recorded in the run's manifest,
/// relative to the run's staging root, and echoed to the progress sink.
#[derive(Debug, Clone)]
pub struct StagingContext {
    progress: Progress,
    root: PathBuf,
    path: PathBuf,
    manifest: Manifest,
}

impl StagingContext {
    /// `path` must be `root` or lie below it.
    pub fn new(progress: Progress, root: impl Into<PathBuf>, path: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            progress,
            root: root.into(),
            path: path.into(),
            manifest,
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Directory this collaborator writes into.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve `rel` against the collaborator's directory.
    /// The empty path resolves to the directory itself.
    pub fn resolve(&self, rel: impl AsRef<Path>) -> crate::Result<PathBuf> {
        let rel = rel.as_ref();
        if rel.as_os_str().is_empty() {
            return Ok(self.path.clone());
        }
        if rel.is_absolute() {
            return Err(ExportError::InvalidPath {
                path: rel.to_path_buf(),
                reason: "path must be relative",
            });
        }
        if rel.components().any(|c| matches!(c, PathComponent::ParentDir)) {
            return Err(ExportError::InvalidPath {
                path: rel.to_path_buf(),
                reason: "path must not leave the staging directory",
            });
        }
        Ok(self.path.join(rel))
    }

    /// Create a directory. The empty path creates the collaborator's own directory.
    pub async fn add_directory(&self, rel: impl AsRef<Path>) -> crate::Result<PathBuf> {
        let dst = self.resolve(rel)?;
        fs::create_dir_all(&dst).await?;
        self.record(&dst);
        Ok(dst)
    }

    /// Copy a single file from `src` to `dst` inside the staging directory.
    pub async fn copy_file(&self, dst: impl AsRef<Path>, src: impl AsRef<Path>) -> crate::Result<u64> {
        let dst = self.resolve(dst)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        let size = fs::copy(src.as_ref(), &dst).await?;
        self.record(&dst);
        Ok(size)
    }

    /// Recursively copy the directory `src` to `dst` inside the staging directory.
    /// Symbolic links are recreated, not followed.
    pub async fn copy_directory(&self, dst: impl AsRef<Path>, src: impl AsRef<Path>) -> crate::Result<()> {
        let dst = self.resolve(dst)?;
        let src = src.as_ref().to_path_buf();

        fs::create_dir_all(&dst).await?;
        self.record(&dst);

        let entries = tokio::task::spawn_blocking({
            let src = src.clone();
            move || walk_directory(&src)
        })
        .await??;

        for entry in entries {
            let target = dst.join(&entry.relative_path);
            match entry.kind {
                EntryKind::Directory => fs::create_dir_all(&target).await?,
                EntryKind::File => {
                    fs::copy(&entry.path, &target).await?;
                }
                EntryKind::Symlink => copy_symlink(&entry.path, &target).await?,
            }
            self.record(&target);
        }
        Ok(())
    }

    /// Create a new file for the collaborator to stream into.
    pub async fn create_file(&self, rel: impl AsRef<Path>) -> crate::Result<fs::File> {
        let dst = self.resolve(rel)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = fs::File::create(&dst).await?;
        self.record(&dst);
        Ok(file)
    }

    /// Write `contents` to a new file.
    pub async fn add_file(&self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> crate::Result<()> {
        let dst = self.resolve(rel)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&dst, contents).await?;
        self.record(&dst);
        Ok(())
    }

    fn record(&self, path: &Path) {
        match path.strip_prefix(&self.path) {
            Ok(rel) if !rel.as_os_str().is_empty() => self.progress.line(rel.display()),
            _ => {}
        }
        let entry = path.strip_prefix(&self.root).unwrap_or(path);
        self.manifest.add(entry);
    }
}

#[cfg(unix)]
async fn copy_symlink(src: &Path, dst: &Path) -> crate::Result<()> {
    let target = fs::read_link(src).await?;
    fs::symlink(target, dst).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn copy_symlink(src: &Path, dst: &Path) -> crate::Result<()> {
    fs::copy(src, dst).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    fn context(root: &Path, name: &str) -> (StagingContext, Manifest) {
        let manifest = Manifest::default();
        let ctx = StagingContext::new(Progress::new(name), root, root.join(name), manifest.clone());
        (ctx, manifest)
    }

    #[tokio::test]
    async fn test_resolve() {
        let (ctx, _) = context(Path::new("/staging"), "sql");
        assert_eq!(ctx.resolve("").unwrap(), PathBuf::from("/staging/sql"));
        assert_eq!(ctx.resolve("dump.sql").unwrap(), PathBuf::from("/staging/sql/dump.sql"));
        assert!(matches!(ctx.resolve("/etc/passwd"), Err(ExportError::InvalidPath { .. })));
        assert!(matches!(ctx.resolve("../other"), Err(ExportError::InvalidPath { .. })));
    }

    #[tokio::test]
    async fn test_helpers_record_manifest() -> crate::Result<()> {
        let staging = TempDir::new()?;
        let source = TempDir::new()?;
        std::fs::write(source.path().join("settings.php"), b"<?php")?;
        std::fs::create_dir(source.path().join("modules"))?;
        std::fs::write(source.path().join("modules/a.module"), b"a")?;

        let (ctx, manifest) = context(staging.path(), "filesystem");
        ctx.add_directory("").await?;
        ctx.copy_file("settings.php", source.path().join("settings.php")).await?;
        ctx.copy_directory("data", source.path()).await?;
        ctx.add_file("notes/readme.txt", "hello").await?;

        let mut file = ctx.create_file("stream.bin").await?;
        file.write_all(b"streamed").await?;
        file.flush().await?;

        assert_eq!(
            manifest.sorted(),
            vec![
                "filesystem",
                "filesystem/data",
                "filesystem/data/modules",
                "filesystem/data/modules/a.module",
                "filesystem/data/settings.php",
                "filesystem/notes/readme.txt",
                "filesystem/settings.php",
                "filesystem/stream.bin",
            ]
        );
        assert_eq!(
            std::fs::read_to_string(staging.path().join("filesystem/data/modules/a.module"))?,
            "a"
        );
        assert_eq!(std::fs::read(staging.path().join("filesystem/stream.bin"))?, b"streamed");
        assert!(ctx.progress().contents().contains("notes/readme.txt\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_file_missing_source_fails() -> crate::Result<()> {
        let staging = TempDir::new()?;
        let (ctx, manifest) = context(staging.path(), "config");
        let err = ctx.copy_file("missing", staging.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
        assert!(manifest.sorted().is_empty());
        assert!(!staging.path().join("config/missing").exists());
        Ok(())
    }
}
