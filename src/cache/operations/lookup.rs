//! Cache lookup and hit/miss detection.
//!
//! A lookup never locks and never mutates. Absent or unparsable metadata is a
//! miss; metadata that parses but contradicts the request is corruption.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::entry::{MetadataRead, open_entry, read_metadata};
use crate::cache::layout::metadata_path;
use crate::cache::{ArtifactCache, ArtifactCacheEntry, CanonicalKey, Sha256Digest};
use crate::error::{CacheError, CacheErrorKind, CacheResult};
use crate::observability::CACHE_TARGET;

impl ArtifactCache {
    /// Looks up the entry cached for `artifact_type` and the raw JSON key.
    ///
    /// Returns `Ok(None)` when no complete entry exists, including when the
    /// entry's metadata is unreadable as JSON (a warning is logged and the
    /// caller is expected to recompute and re-cache).
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidKey`](crate::CacheErrorKind::InvalidKey) error for
    /// malformed keys, a [`Corruption`](crate::CacheErrorKind::Corruption)
    /// error if the metadata lacks a type, records a different type, or the
    /// `content/` directory is missing, and an I/O error if the metadata
    /// cannot be read.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use artifact_cache::ArtifactCache;
    ///
    /// let cache = ArtifactCache::open("/var/cache/build-artifacts");
    /// match cache.lookup("download", r#"{"uri":"https://example/a.txt"}"#)? {
    ///     Some(entry) => println!("hit: {}", entry.content_path()),
    ///     None => println!("miss"),
    /// }
    /// # Ok::<(), artifact_cache::CacheError>(())
    /// ```
    pub fn lookup(
        &self,
        artifact_type: &str,
        json_key: &str,
    ) -> CacheResult<Option<ArtifactCacheEntry>> {
        let key = CanonicalKey::from_json(artifact_type, json_key)?;
        self.lookup_canonical(artifact_type, &key)
    }

    /// Looks up the entry cached for `artifact_type` and a serialisable key.
    ///
    /// # Errors
    ///
    /// See [`ArtifactCache::lookup`].
    pub fn lookup_value(
        &self,
        artifact_type: &str,
        key: &impl Serialize,
    ) -> CacheResult<Option<ArtifactCacheEntry>> {
        let canonical = CanonicalKey::from_value(artifact_type, key)?;
        self.lookup_canonical(artifact_type, &canonical)
    }

    /// Looks up the entry for an already canonicalised key.
    ///
    /// # Errors
    ///
    /// See [`ArtifactCache::lookup`].
    pub fn lookup_canonical(
        &self,
        artifact_type: &str,
        key: &CanonicalKey,
    ) -> CacheResult<Option<ArtifactCacheEntry>> {
        let digest = key.digest();
        let entry_dir = self.layout.entry_dir(&digest);

        let metadata = match read_metadata(&entry_dir)? {
            MetadataRead::Missing => {
                debug!(
                    target: CACHE_TARGET,
                    artifact_type,
                    digest = %digest,
                    "cache miss"
                );
                return Ok(None);
            }
            MetadataRead::Unparsable(err) => {
                warn!(
                    target: CACHE_TARGET,
                    path = %metadata_path(&entry_dir),
                    error = %err,
                    "failed to parse artifact cache metadata, treating entry as absent"
                );
                return Ok(None);
            }
            MetadataRead::Parsed(metadata) => metadata,
        };

        let entry = match open_entry(&entry_dir, digest.clone(), metadata, Some(artifact_type)) {
            Ok(entry) => entry,
            // A writer retracts metadata before wiping content, so a failure
            // here may mean the entry was replaced mid-lookup. Judge the entry
            // by its current metadata instead.
            Err(err) if err.kind() == CacheErrorKind::Corruption => {
                match read_metadata(&entry_dir)? {
                    MetadataRead::Parsed(current) => {
                        open_entry(&entry_dir, digest, current, Some(artifact_type))
                            .inspect_err(|retry_err| log_corruption(&entry_dir, retry_err))?
                    }
                    MetadataRead::Missing | MetadataRead::Unparsable(_) => {
                        debug!(
                            target: CACHE_TARGET,
                            artifact_type,
                            digest = %digest,
                            "cache entry replaced during lookup, treating as miss"
                        );
                        return Ok(None);
                    }
                }
            }
            Err(err) => return Err(err),
        };

        debug!(
            target: CACHE_TARGET,
            artifact_type,
            digest = %entry.digest(),
            path = %entry.content_path(),
            "cache hit"
        );
        Ok(Some(entry))
    }

    /// Returns the blob whose contents hash to `digest`, if stored.
    ///
    /// Bypasses artifact keys entirely, so callers can deduplicate by content
    /// regardless of how the content was produced.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgument`](crate::CacheErrorKind::InvalidArgument)
    /// error unless `digest` is 64 hex characters, and an I/O error if the
    /// blob cannot be inspected.
    pub fn lookup_blob_by_sha256(&self, digest: &str) -> CacheResult<Option<Utf8PathBuf>> {
        let parsed = Sha256Digest::parse(digest)?;
        let blob = self.store.lookup(&parsed)?;
        debug!(
            target: CACHE_TARGET,
            digest = %parsed,
            hit = blob.is_some(),
            "blob lookup"
        );
        Ok(blob)
    }
}

fn log_corruption(entry_dir: &Utf8Path, err: &CacheError) {
    error!(
        target: CACHE_TARGET,
        path = %entry_dir,
        error = %err,
        "artifact cache entry violates its invariants"
    );
}
