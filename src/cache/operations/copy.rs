//! Copying cached files back out of the cache.
//!
//! Callers receive private copies so that editing the restored file never
//! mutates the shared blob it is hard-linked to.

use camino::Utf8Path;
use color_eyre::eyre::Context;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::CacheResult;
use crate::observability::CACHE_TARGET;

/// Copies a cached file to `target`, replacing any existing file there.
///
/// The copy is staged next to `target` and renamed into place, so an
/// interrupted restore never leaves a truncated file at `target`. The source
/// file's permissions are carried over on a best-effort basis.
///
/// # Errors
///
/// Returns an error if the source cannot be read, the target's parent
/// directory cannot be created, or the staged copy cannot be renamed.
pub(crate) fn copy_file_out(source: &Utf8Path, target: &Path) -> CacheResult<()> {
    log_copy_start(source, target);

    let parent = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| {
        format!("failed to create target directory for cache copy: {}", parent.display())
    })?;

    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage cache copy in {}", parent.display()))?;
    let mut reader = fs::File::open(source)
        .with_context(|| format!("failed to open cached file {source}"))?;
    io::copy(&mut reader, staged.as_file_mut())
        .with_context(|| format!("failed to copy cached file {source} to {}", target.display()))?;

    copy_permissions(source.as_std_path(), staged.path());

    staged
        .persist(target)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move cache copy into {}", target.display()))?;

    log_copy_complete(source, target);
    Ok(())
}

fn log_copy_start(source: &Utf8Path, target: &Path) {
    debug!(
        target: CACHE_TARGET,
        source = %source,
        target = %target.display(),
        "copying file from cache"
    );
}

fn log_copy_complete(source: &Utf8Path, target: &Path) {
    debug!(
        target: CACHE_TARGET,
        source = %source,
        target = %target.display(),
        "cache copy completed"
    );
}

/// Best-effort permission copy from source to destination.
fn copy_permissions(src: &Path, dst: &Path) {
    let Ok(metadata) = fs::metadata(src) else {
        return;
    };
    if let Err(err) = fs::set_permissions(dst, metadata.permissions()) {
        debug!(
            target: CACHE_TARGET,
            src = %src.display(),
            dst = %dst.display(),
            error = %err,
            "failed to copy permissions (best effort)"
        );
    }
}
