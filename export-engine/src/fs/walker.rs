//! Directory traversal for staging copies and archives.
//!
//! Entries are produced in a stable order (sorted by file name, parents
//! before children) so that archives of the same tree are reproducible.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

/// An entry discovered below the walk root. The root itself is never yielded.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    pub kind: EntryKind,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> Self {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Self {
            path,
            relative_path,
            kind,
        }
    }
}

/// Walk a directory tree and collect every entry below `root`.
pub fn walk_directory(root: &Path) -> crate::Result<Vec<FileInfo>> {
    let mut entries = Vec::new();
    walk_directory_with_callback(root, |info| {
        entries.push(info);
        Ok(())
    })?;
    Ok(entries)
}

/// Walk a directory tree, calling `callback` for each entry in order.
/// Symbolic links are reported, never followed.
///
/// The walk stops at the first error returned by the callback.
pub fn walk_directory_with_callback<F>(root: &Path, mut callback: F) -> crate::Result<()>
where
    F: FnMut(FileInfo) -> crate::Result<()>,
{
    let walker = WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        callback(FileInfo::from_entry(&entry, root))?;
    }

    Ok(())
}
