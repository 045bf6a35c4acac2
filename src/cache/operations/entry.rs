//! Reading and validating entry directories shared by lookup and scans.

use camino::Utf8Path;
use color_eyre::eyre::{Context, eyre};
use std::fs;
use std::io::ErrorKind;

use crate::cache::layout::{content_path, metadata_path};
use crate::cache::{ArtifactCacheEntry, EntryMetadata, Sha256Digest};
use crate::error::{CacheError, CacheResult};

/// Outcome of reading an entry's `metadata.json`.
#[derive(Debug)]
pub(super) enum MetadataRead {
    /// No metadata file: the entry is absent or was never completed.
    Missing,
    /// The metadata file exists but does not parse.
    Unparsable(serde_json::Error),
    /// The metadata parsed successfully.
    Parsed(EntryMetadata),
}

/// Reads `metadata.json` from `entry_dir`.
///
/// Only I/O failures other than a missing file are errors; parse failures are
/// returned as [`MetadataRead::Unparsable`] so each caller can decide how
/// strict to be.
pub(super) fn read_metadata(entry_dir: &Utf8Path) -> CacheResult<MetadataRead> {
    let path = metadata_path(entry_dir);
    let text = match fs::read(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(MetadataRead::Missing),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read artifact cache metadata file '{path}'"))
                .map_err(CacheError::from);
        }
    };

    Ok(match serde_json::from_slice::<EntryMetadata>(&text) {
        Ok(metadata) => MetadataRead::Parsed(metadata),
        Err(err) => MetadataRead::Unparsable(err),
    })
}

/// Builds an entry view after checking the metadata and `content/` directory.
///
/// `expected_type`, when given, must match the recorded type.
pub(super) fn open_entry(
    entry_dir: &Utf8Path,
    digest: Sha256Digest,
    metadata: EntryMetadata,
    expected_type: Option<&str>,
) -> CacheResult<ArtifactCacheEntry> {
    if metadata.artifact_type.is_empty() {
        return Err(CacheError::corruption(eyre!(
            "artifact cache metadata at '{}' is missing artifact type",
            metadata_path(entry_dir)
        )));
    }
    if let Some(expected) = expected_type {
        if metadata.artifact_type != expected {
            return Err(CacheError::corruption(eyre!(
                "artifact cache metadata at '{}' has type '{}' but expected '{expected}'",
                metadata_path(entry_dir),
                metadata.artifact_type
            )));
        }
    }

    let content = content_path(entry_dir);
    match fs::metadata(&content) {
        Ok(stat) if stat.is_dir() => {}
        Ok(_) => {
            return Err(CacheError::corruption(eyre!(
                "artifact cached content '{content}' is not a directory"
            )));
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(CacheError::corruption(eyre!(
                "artifact cached content dir '{content}' is missing"
            )));
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to stat artifact cached content dir '{content}'"))
                .map_err(CacheError::from);
        }
    }

    Ok(ArtifactCacheEntry {
        entry_dir: entry_dir.to_path_buf(),
        content_path: content,
        artifact_type: metadata.artifact_type,
        digest,
    })
}
