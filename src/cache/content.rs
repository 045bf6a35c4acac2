//! Content-addressed blob storage.
//!
//! Every regular file imported into the cache is stored once under
//! `files/`, named by the SHA-256 of its contents. Blobs are immutable once
//! renamed into place; entries reference them through hard links, or through
//! private copies on filesystems without hard-link support.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, eyre};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;

use super::digest::Sha256Digest;
use super::layout::CacheLayout;
use crate::error::{CacheError, CacheResult};
use crate::fs::ensure_dir_exists;
use crate::observability::CACHE_TARGET;

/// How entry content refers to blobs in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Hard-link entry files to the shared blob (no data duplication).
    #[default]
    HardLink,
    /// Copy the blob into each entry, for filesystems without hard links.
    Copy,
}

impl LinkMode {
    /// Returns the configuration spelling of this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HardLink => "hardlink",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hardlink" | "hard-link" | "link" => Ok(Self::HardLink),
            "copy" => Ok(Self::Copy),
            other => Err(CacheError::invalid_argument(eyre!(
                "unknown link mode '{other}': expected 'hardlink' or 'copy'"
            ))),
        }
    }
}

/// Blob store rooted at a cache's `files/` directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    layout: CacheLayout,
    link_mode: LinkMode,
}

impl ContentStore {
    /// Creates a store over the given layout.
    #[must_use]
    pub const fn new(layout: CacheLayout, link_mode: LinkMode) -> Self {
        Self { layout, link_mode }
    }

    /// Returns how [`ContentStore::materialize`] places blobs.
    #[must_use]
    pub const fn link_mode(&self) -> LinkMode {
        self.link_mode
    }

    /// Returns the blob path for `digest` if the blob exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob path cannot be inspected, or a
    /// [`Corruption`](crate::CacheErrorKind::Corruption) error if a directory
    /// sits where the blob should be.
    pub fn lookup(&self, digest: &Sha256Digest) -> CacheResult<Option<Utf8PathBuf>> {
        let blob = self.layout.blob_path(digest);
        match fs::metadata(&blob) {
            Ok(metadata) if metadata.is_dir() => Err(CacheError::corruption(eyre!(
                "blob path '{blob}' is a directory"
            ))),
            Ok(_) => Ok(Some(blob)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("failed to inspect blob '{blob}'"))
                .map_err(CacheError::from),
        }
    }

    /// Returns the blob matching `source`'s contents, importing it first when
    /// absent.
    ///
    /// Existing blobs are trusted without re-hashing. New blobs are copied to
    /// a temporary file in the destination shard, flushed to disk, and renamed
    /// into place so the canonical path never holds partial content.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing, copying, flushing, or renaming fails.
    pub fn get_or_add(&self, source: &Path) -> CacheResult<Utf8PathBuf> {
        let digest = Sha256Digest::of_file(source)
            .with_context(|| format!("failed to compute SHA-256 of '{}'", source.display()))?;

        if let Some(existing) = self.lookup(&digest)? {
            debug!(
                target: CACHE_TARGET,
                digest = %digest,
                source = %source.display(),
                "blob already present"
            );
            return Ok(existing);
        }

        let blob = self.layout.blob_path(&digest);
        let shard_dir = blob
            .parent()
            .ok_or_else(|| eyre!("blob path '{blob}' has no parent directory"))?;
        ensure_dir_exists(shard_dir)?;

        write_blob(source, shard_dir, &blob)?;

        debug!(
            target: CACHE_TARGET,
            digest = %digest,
            source = %source.display(),
            "imported blob"
        );
        Ok(blob)
    }

    /// Places `blob` at `dest` according to the store's [`LinkMode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the link or copy fails, including when `dest`
    /// already exists.
    pub fn materialize(&self, blob: &Utf8Path, dest: &Path) -> CacheResult<()> {
        match self.link_mode {
            LinkMode::HardLink => {
                debug!(
                    target: CACHE_TARGET,
                    blob = %blob,
                    dest = %dest.display(),
                    "creating hard link"
                );
                fs::hard_link(blob, dest).with_context(|| {
                    format!("failed to create hard link '{}' => '{blob}'", dest.display())
                })?;
            }
            LinkMode::Copy => {
                copy_new_file(blob.as_std_path(), dest).with_context(|| {
                    format!("failed to copy blob '{blob}' to '{}'", dest.display())
                })?;
            }
        }
        Ok(())
    }
}

/// Copies `source` into a temporary file in `shard_dir` and renames it to `blob`.
///
/// The blob takes the source's permission bits, so executables stay
/// executable through hard links. The first importer of a given content
/// decides the mode.
fn write_blob(source: &Path, shard_dir: &Utf8Path, blob: &Utf8Path) -> CacheResult<()> {
    let mut temp = NamedTempFile::new_in(shard_dir)
        .with_context(|| format!("failed to create temporary file in '{shard_dir}'"))?;

    let mut reader = fs::File::open(source)
        .with_context(|| format!("failed to open '{}'", source.display()))?;
    io::copy(&mut reader, temp.as_file_mut()).with_context(|| {
        format!(
            "failed to copy '{}' to '{}'",
            source.display(),
            temp.path().display()
        )
    })?;
    let permissions = reader
        .metadata()
        .with_context(|| format!("failed to stat '{}'", source.display()))?
        .permissions();
    temp.as_file()
        .set_permissions(permissions)
        .with_context(|| format!("failed to set permissions on '{}'", temp.path().display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to flush '{}'", temp.path().display()))?;

    // Dropping an unpersisted temp file removes it, so error paths above
    // leave no residue in the shard.
    temp.persist(blob)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to rename temporary blob to '{blob}'"))?;
    Ok(())
}

/// Copies `src` to `dest`, refusing to overwrite an existing file.
fn copy_new_file(src: &Path, dest: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;
    io::copy(&mut reader, &mut writer)?;
    fs::set_permissions(dest, reader.metadata()?.permissions())?;
    Ok(())
}
