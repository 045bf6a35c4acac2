//! Download cache: the artifact cache specialised to URI-keyed single files.
//!
//! Each download is cached under the artifact type [`DOWNLOAD_ARTIFACT_TYPE`]
//! with the key `{"uri": <uri>}`, and its entry's `content/` directory holds
//! exactly one regular file named after the downloaded file. Downloads can
//! also be found by content digest, independently of the URI they came from.
//!
//! The `try_*` helpers and [`DownloadCache::fetch_with`] implement the
//! cache-aware download flow: a cache problem is logged and never fails the
//! download itself.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, eyre};
use serde::Serialize;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::cache::{ArtifactCache, ArtifactCacheEntry, copy_file_out};
use crate::error::{CacheError, CacheResult};
use crate::observability::DOWNLOAD_TARGET;

/// Artifact type under which downloads are cached.
pub const DOWNLOAD_ARTIFACT_TYPE: &str = "download";

/// Cache key identifying a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadKey<'a> {
    /// Source URI of the download.
    pub uri: &'a str,
}

/// A cached download on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    path: Utf8PathBuf,
}

impl DownloadEntry {
    /// Returns the path of the cached file.
    ///
    /// The file may be a hard link to a shared blob; copy it before
    /// modifying it.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Where [`DownloadCache::fetch_with`] obtained the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// The file was copied out of the cache.
    Cache,
    /// The fetch callback produced the file.
    Fetched,
}

/// URI-keyed view over an [`ArtifactCache`].
#[derive(Debug, Clone)]
pub struct DownloadCache {
    cache: ArtifactCache,
}

impl DownloadCache {
    /// Wraps an artifact cache.
    #[must_use]
    pub const fn open(cache: ArtifactCache) -> Self {
        Self { cache }
    }

    /// Returns the underlying artifact cache.
    #[must_use]
    pub const fn artifact_cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Looks up the cached download for `uri`.
    ///
    /// # Errors
    ///
    /// Returns a [`Corruption`](crate::CacheErrorKind::Corruption) error if
    /// the entry does not contain exactly one regular file, and otherwise
    /// propagates the errors of [`ArtifactCache::lookup`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use artifact_cache::{ArtifactCache, download::DownloadCache};
    ///
    /// let downloads = DownloadCache::open(ArtifactCache::open("/var/cache/build-artifacts"));
    /// if let Some(hit) = downloads.lookup_by_uri("https://example.com/src.tar.gz")? {
    ///     println!("cached at {}", hit.path());
    /// }
    /// # Ok::<(), artifact_cache::CacheError>(())
    /// ```
    pub fn lookup_by_uri(&self, uri: &str) -> CacheResult<Option<DownloadEntry>> {
        let Some(entry) = self
            .cache
            .lookup_value(DOWNLOAD_ARTIFACT_TYPE, &DownloadKey { uri })?
        else {
            return Ok(None);
        };
        single_file(&entry).map(|path| Some(DownloadEntry { path }))
    }

    /// Looks up any cached file whose contents hash to `digest`.
    ///
    /// # Errors
    ///
    /// See [`ArtifactCache::lookup_blob_by_sha256`].
    pub fn lookup_by_sha256(&self, digest: &str) -> CacheResult<Option<DownloadEntry>> {
        Ok(self
            .cache
            .lookup_blob_by_sha256(digest)?
            .map(|path| DownloadEntry { path }))
    }

    /// Caches `downloaded_file` as the download for `uri`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgument`](crate::CacheErrorKind::InvalidArgument)
    /// error unless `downloaded_file` is a regular file, and otherwise
    /// propagates the errors of [`ArtifactCache::cache`].
    pub fn cache_download(&self, uri: &str, downloaded_file: &Path) -> CacheResult<DownloadEntry> {
        let stat = fs::metadata(downloaded_file).with_context(|| {
            format!("failed to check downloaded file '{}'", downloaded_file.display())
        })?;
        if !stat.is_file() {
            return Err(CacheError::invalid_argument(eyre!(
                "downloaded path '{}' is not a regular file",
                downloaded_file.display()
            )));
        }
        let name = downloaded_file
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| {
                CacheError::invalid_argument(eyre!(
                    "downloaded file '{}' has no UTF-8 file name",
                    downloaded_file.display()
                ))
            })?;

        let entry = self
            .cache
            .cache_value(DOWNLOAD_ARTIFACT_TYPE, &DownloadKey { uri }, downloaded_file)?;
        let path = entry.content_path().join(name);
        debug!(target: DOWNLOAD_TARGET, uri, path = %path, "cached download");
        Ok(DownloadEntry { path })
    }

    /// Copies the cached download for `uri` to `dst`.
    ///
    /// Returns `true` on a hit. Lookup and copy failures are logged as
    /// warnings and reported as a miss so the caller falls back to
    /// downloading.
    #[must_use]
    pub fn try_restore(&self, uri: &str, dst: &Path) -> bool {
        let entry = match self.lookup_by_uri(uri) {
            Ok(Some(entry)) => entry,
            Ok(None) => return false,
            Err(err) => {
                warn!(
                    target: DOWNLOAD_TARGET,
                    uri,
                    error = %err,
                    "failed to look up download cache entry"
                );
                return false;
            }
        };

        match copy_file_out(entry.path(), dst) {
            Ok(()) => {
                debug!(
                    target: DOWNLOAD_TARGET,
                    uri,
                    dst = %dst.display(),
                    "restored download from cache"
                );
                true
            }
            Err(err) => {
                warn!(
                    target: DOWNLOAD_TARGET,
                    source = %entry.path(),
                    dst = %dst.display(),
                    error = %err,
                    "failed to copy cached download"
                );
                false
            }
        }
    }

    /// Caches `file` as the download for `uri`, logging a warning on failure.
    pub fn try_store(&self, uri: &str, file: &Path) {
        if let Err(err) = self.cache_download(uri, file) {
            warn!(
                target: DOWNLOAD_TARGET,
                uri,
                error = %err,
                "failed to cache download"
            );
        }
    }

    /// Places the file for `uri` at `dst`, from the cache when possible.
    ///
    /// On a miss `fetch(uri, dst)` is invoked to produce the file, which is
    /// then cached for next time.
    ///
    /// # Errors
    ///
    /// Returns the fetch callback's error. Cache failures are only logged.
    pub fn fetch_with<F>(&self, uri: &str, dst: &Path, fetch: F) -> CacheResult<FetchSource>
    where
        F: FnOnce(&str, &Path) -> color_eyre::Result<()>,
    {
        if self.try_restore(uri, dst) {
            return Ok(FetchSource::Cache);
        }
        fetch(uri, dst).with_context(|| format!("failed to fetch '{uri}'"))?;
        self.try_store(uri, dst);
        Ok(FetchSource::Fetched)
    }
}

/// Returns the single regular file in `entry`'s content directory.
fn single_file(entry: &ArtifactCacheEntry) -> CacheResult<Utf8PathBuf> {
    let content = entry.content_path();
    let mut names = Vec::new();
    for dir_entry in fs::read_dir(content)
        .with_context(|| format!("failed to read download cache content '{content}'"))?
    {
        let item = dir_entry
            .with_context(|| format!("failed to read download cache content '{content}'"))?;
        let is_file = item
            .file_type()
            .with_context(|| format!("failed to stat entry in '{content}'"))?
            .is_file();
        names.push((item.file_name(), is_file));
    }

    match names.as_slice() {
        [(name, true)] => name
            .to_str()
            .map(|utf8| content.join(utf8))
            .ok_or_else(|| {
                CacheError::corruption(eyre!(
                    "download cache file in '{content}' has a non UTF-8 name"
                ))
            }),
        _ => Err(CacheError::corruption(eyre!(
            "expected exactly one file in download cache entry content directory '{content}'"
        ))),
    }
}
