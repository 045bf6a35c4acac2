//! Cache population from a freshly produced artifact.
//!
//! An insert holds an exclusive lock on the entry directory for its whole
//! duration, wipes whatever the directory held, imports the artifact tree
//! through the blob store, and writes `metadata.json` last.

use camino::Utf8Path;
use color_eyre::eyre::{Context, eyre};
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cache::layout::{KEY_FILENAME, content_path, metadata_path};
use crate::cache::{ArtifactCache, ArtifactCacheEntry, CanonicalKey, EntryMetadata, FileLock};
use crate::error::{CacheError, CacheResult};
use crate::fs::{ensure_dir_exists, remove_dir_contents};
use crate::observability::CACHE_TARGET;

impl ArtifactCache {
    /// Caches the file or directory at `source` under `artifact_type` and the
    /// raw JSON key, replacing any previous entry for the same key.
    ///
    /// A regular file is cached as `content/<file name>`; a directory's
    /// contents are mirrored beneath `content/`. Concurrent inserts of the
    /// same key serialise on an exclusive lock and the last writer wins.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgument`](crate::CacheErrorKind::InvalidArgument)
    /// error for an empty type or key or when `source` contains something
    /// other than regular files and directories, an
    /// [`InvalidKey`](crate::CacheErrorKind::InvalidKey) error for malformed
    /// keys, and an I/O error if any filesystem step fails. A failed insert
    /// leaves no visible entry.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use artifact_cache::ArtifactCache;
    /// use std::path::Path;
    ///
    /// let cache = ArtifactCache::open("/var/cache/build-artifacts");
    /// let entry = cache.cache(
    ///     "download",
    ///     r#"{"uri":"https://example/a.txt"}"#,
    ///     Path::new("/tmp/a.txt"),
    /// )?;
    /// assert!(entry.content_path().join("a.txt").exists());
    /// # Ok::<(), artifact_cache::CacheError>(())
    /// ```
    pub fn cache(
        &self,
        artifact_type: &str,
        json_key: &str,
        source: &Path,
    ) -> CacheResult<ArtifactCacheEntry> {
        if json_key.is_empty() {
            return Err(CacheError::invalid_argument(eyre!(
                "cannot cache artifact with empty key"
            )));
        }
        ensure_type_present(artifact_type)?;
        let key = CanonicalKey::from_json(artifact_type, json_key)?;
        self.cache_canonical(artifact_type, &key, source)
    }

    /// Caches `source` under `artifact_type` and a serialisable key.
    ///
    /// # Errors
    ///
    /// See [`ArtifactCache::cache`].
    pub fn cache_value(
        &self,
        artifact_type: &str,
        key: &impl Serialize,
        source: &Path,
    ) -> CacheResult<ArtifactCacheEntry> {
        ensure_type_present(artifact_type)?;
        let canonical = CanonicalKey::from_value(artifact_type, key)?;
        self.cache_canonical(artifact_type, &canonical, source)
    }

    /// Caches `source` under an already canonicalised key.
    ///
    /// # Errors
    ///
    /// See [`ArtifactCache::cache`].
    pub fn cache_canonical(
        &self,
        artifact_type: &str,
        key: &CanonicalKey,
        source: &Path,
    ) -> CacheResult<ArtifactCacheEntry> {
        ensure_type_present(artifact_type)?;
        let source_stat = fs::metadata(source).with_context(|| {
            format!("failed to check input path '{}'", source.display())
        })?;

        let digest = key.digest();
        let entry_dir = self.layout.entry_dir(&digest);
        log_populate_start(artifact_type, key, source, &entry_dir);

        ensure_dir_exists(&entry_dir).with_context(|| {
            format!("failed to create artifact cache entry directory '{entry_dir}'")
        })?;

        // Held until this function returns, on success and error paths alike.
        let _lock = FileLock::acquire_exclusive(&entry_dir).with_context(|| {
            format!("failed to lock artifact cache entry directory '{entry_dir}'")
        })?;

        // Invalidate before wiping so readers never see metadata without content.
        retract_metadata(&entry_dir)?;
        remove_dir_contents(&entry_dir).with_context(|| {
            format!("failed to remove existing artifact cache entry at '{entry_dir}'")
        })?;

        let content = content_path(&entry_dir);
        fs::create_dir(&content).with_context(|| {
            format!("failed to create artifact cache entry content directory '{content}'")
        })?;

        if source_stat.is_dir() {
            self.import_dir(source, content.as_std_path())?;
        } else if source_stat.is_file() {
            let name = source.file_name().ok_or_else(|| {
                CacheError::invalid_argument(eyre!(
                    "input path '{}' has no file name",
                    source.display()
                ))
            })?;
            self.import_file(source, &content.as_std_path().join(name))?;
        } else {
            return Err(unsupported_file_type(source));
        }

        fs::write(entry_dir.join(KEY_FILENAME), key.as_str())
            .context("failed to write cache artifact key")?;

        write_metadata(&entry_dir, artifact_type)?;

        debug!(
            target: CACHE_TARGET,
            artifact_type,
            digest = %digest,
            path = %content,
            "cache population completed"
        );

        Ok(ArtifactCacheEntry {
            entry_dir,
            content_path: content,
            artifact_type: artifact_type.to_owned(),
            digest,
        })
    }

    /// Mirrors the directory `src` beneath `dst`, importing each regular file.
    fn import_dir(&self, src: &Path, dst: &Path) -> CacheResult<()> {
        let entries = fs::read_dir(src)
            .with_context(|| format!("failed to read input directory '{}'", src.display()))?;

        for dir_entry in entries {
            let entry = dir_entry
                .with_context(|| format!("failed to read entry in '{}'", src.display()))?;
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat '{}'", src_path.display()))?;

            if file_type.is_dir() {
                fs::create_dir(&dst_path).with_context(|| {
                    format!("failed to create directory '{}'", dst_path.display())
                })?;
                self.import_dir(&src_path, &dst_path)?;
            } else if file_type.is_file() {
                self.import_file(&src_path, &dst_path)?;
            } else {
                return Err(unsupported_file_type(&src_path));
            }
        }
        Ok(())
    }

    fn import_file(&self, src: &Path, dst: &Path) -> CacheResult<()> {
        let blob = self.store.get_or_add(src)?;
        self.store.materialize(&blob, dst)
    }
}

fn ensure_type_present(artifact_type: &str) -> CacheResult<()> {
    if artifact_type.is_empty() {
        Err(CacheError::invalid_argument(eyre!(
            "cannot cache artifact with empty type"
        )))
    } else {
        Ok(())
    }
}

fn unsupported_file_type(path: &Path) -> CacheError {
    CacheError::invalid_argument(eyre!("unsupported file type for '{}'", path.display()))
}

fn retract_metadata(entry_dir: &Utf8Path) -> CacheResult<()> {
    let path = metadata_path(entry_dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to remove artifact cache metadata '{path}'"))
            .map_err(CacheError::from),
    }
}

/// Atomically writes `metadata.json`; its appearance marks the entry valid.
fn write_metadata(entry_dir: &Utf8Path, artifact_type: &str) -> CacheResult<()> {
    let metadata = EntryMetadata {
        artifact_type: artifact_type.to_owned(),
    };
    let text =
        serde_json::to_vec(&metadata).context("failed to serialise cache artifact metadata")?;

    let mut temp = NamedTempFile::new_in(entry_dir)
        .with_context(|| format!("failed to create temporary metadata file in '{entry_dir}'"))?;
    temp.write_all(&text)
        .context("failed to write cache artifact metadata")?;
    temp.as_file()
        .sync_all()
        .context("failed to flush cache artifact metadata")?;

    let path = metadata_path(entry_dir);
    temp.persist(&path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to rename cache artifact metadata into '{path}'"))?;
    Ok(())
}

fn log_populate_start(
    artifact_type: &str,
    key: &CanonicalKey,
    source: &Path,
    entry_dir: &Utf8Path,
) {
    debug!(
        target: CACHE_TARGET,
        artifact_type,
        key = key.as_str(),
        source = %source.display(),
        entry = %entry_dir,
        "caching artifact"
    );
}
