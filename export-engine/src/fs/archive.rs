//! Packaging of staging directories into `.tar.gz` archives.

use crate::fs::walker::walk_directory_with_callback;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write every entry below `src` into a gzip-compressed tar archive at `dst`.
///
/// Entries are written in traversal order (parents before children, siblings
/// sorted by name) with their mode bits. Symbolic links are stored as links.
/// `on_copy` is called with the relative and absolute path of each entry
/// before it is read.
///
/// Returns the size of the written archive. On error the archive is left
/// partially written and should be discarded by the caller.
pub fn package<F>(dst: &Path, src: &Path, mut on_copy: F) -> crate::Result<u64>
where
    F: FnMut(&Path, &Path),
{
    let file = File::create(dst)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    walk_directory_with_callback(src, |entry| {
        on_copy(&entry.relative_path, &entry.path);
        builder.append_path_with_name(&entry.path, &entry.relative_path)?;
        Ok(())
    })?;

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(file.metadata()?.len())
}
