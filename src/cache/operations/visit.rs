//! Enumeration of every entry in a cache root.
//!
//! Scans `artifacts/<2 hex>/<2 hex>/<60 hex>/` without locking. Directories
//! that do not match that exact shape are ignored, entries without metadata
//! are treated as incomplete and skipped, and every other problem is handed to
//! the visitor as a per-entry error so one bad entry never hides the rest.

use camino::Utf8Path;
use color_eyre::Report;
use color_eyre::eyre::{Context, eyre};
use std::fs;
use std::io::{self, ErrorKind};
use tracing::{debug, warn};

use super::entry::{MetadataRead, open_entry, read_metadata};
use crate::cache::layout::metadata_path;
use crate::cache::{ArtifactCache, ArtifactCacheEntry, SHA256_HEX_LEN, Sha256Digest};
use crate::error::{CacheError, CacheResult};
use crate::observability::CACHE_TARGET;

/// Length of each of the two shard directory names.
const SHARD_LEN: usize = 2;
/// Length of the leaf directory name holding an entry.
const LEAF_LEN: usize = SHA256_HEX_LEN - 2 * SHARD_LEN;

/// Tally of a [`ArtifactCache::visit_all`] scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitSummary {
    /// Entries handed to the visitor as `Ok`.
    pub entries: usize,
    /// Malformed entries or unreadable shards handed to the visitor as `Err`.
    pub entry_errors: usize,
    /// Visitor invocations that returned an error.
    pub visitor_errors: usize,
}

impl ArtifactCache {
    /// Invokes `visitor` once per complete or malformed entry in the cache.
    ///
    /// Entries are visited in lexical digest order. A visitor error is logged
    /// and counted, and enumeration continues with the next entry.
    ///
    /// # Errors
    ///
    /// Returns an I/O error only if the top-level `artifacts/` directory
    /// exists but cannot be read. A cache that has never been written to
    /// yields an empty summary.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use artifact_cache::ArtifactCache;
    ///
    /// let cache = ArtifactCache::open("/var/cache/build-artifacts");
    /// let summary = cache.visit_all(|entry| {
    ///     if let Ok(entry) = entry {
    ///         println!("{} {}", entry.artifact_type(), entry.content_path());
    ///     }
    ///     Ok(())
    /// })?;
    /// println!("{} entries", summary.entries);
    /// # Ok::<(), artifact_cache::CacheError>(())
    /// ```
    pub fn visit_all<F>(&self, mut visitor: F) -> CacheResult<VisitSummary>
    where
        F: FnMut(CacheResult<ArtifactCacheEntry>) -> color_eyre::Result<()>,
    {
        let artifacts = self.layout.artifacts_dir();
        let mut summary = VisitSummary::default();

        let first_shards = match shard_dirs(&artifacts, SHARD_LEN) {
            Ok(names) => names,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(target: CACHE_TARGET, root = %artifacts, "no artifacts directory to scan");
                return Ok(summary);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read artifacts directory '{artifacts}'"))
                    .map_err(CacheError::from);
            }
        };

        for first in first_shards {
            let first_dir = artifacts.join(&first);
            let Some(second_shards) =
                list_or_report(&first_dir, SHARD_LEN, &mut summary, &mut visitor)
            else {
                continue;
            };
            for second in second_shards {
                let second_dir = first_dir.join(&second);
                let Some(leaves) = list_or_report(&second_dir, LEAF_LEN, &mut summary, &mut visitor)
                else {
                    continue;
                };
                for leaf in leaves {
                    let hex = format!("{first}{second}{leaf}");
                    if let Some(result) = scan_entry(&second_dir.join(&leaf), &hex) {
                        dispatch(result, &mut summary, &mut visitor);
                    }
                }
            }
        }

        debug!(
            target: CACHE_TARGET,
            entries = summary.entries,
            entry_errors = summary.entry_errors,
            visitor_errors = summary.visitor_errors,
            "cache scan completed"
        );
        Ok(summary)
    }
}

/// Lists a shard directory, reporting a read failure to the visitor.
fn list_or_report<F>(
    dir: &Utf8Path,
    name_len: usize,
    summary: &mut VisitSummary,
    visitor: &mut F,
) -> Option<Vec<String>>
where
    F: FnMut(CacheResult<ArtifactCacheEntry>) -> color_eyre::Result<()>,
{
    match shard_dirs(dir, name_len) {
        Ok(names) => Some(names),
        Err(err) => {
            let report = Report::new(err)
                .wrap_err(format!("failed to read cache shard directory '{dir}'"));
            dispatch(Err(CacheError::from(report)), summary, visitor);
            None
        }
    }
}

/// Reads the entry at `entry_dir`; `None` means the entry is incomplete.
fn scan_entry(entry_dir: &Utf8Path, hex: &str) -> Option<CacheResult<ArtifactCacheEntry>> {
    let digest = match Sha256Digest::parse(hex) {
        Ok(digest) => digest,
        Err(err) => return Some(Err(err)),
    };

    match read_metadata(entry_dir) {
        Ok(MetadataRead::Missing) => {
            debug!(target: CACHE_TARGET, path = %entry_dir, "skipping incomplete entry");
            None
        }
        Ok(MetadataRead::Unparsable(err)) => Some(Err(CacheError::corruption(eyre!(
            "failed to parse artifact cache metadata '{}': {err}",
            metadata_path(entry_dir)
        )))),
        Ok(MetadataRead::Parsed(metadata)) => Some(open_entry(entry_dir, digest, metadata, None)),
        Err(err) => Some(Err(err)),
    }
}

fn dispatch<F>(result: CacheResult<ArtifactCacheEntry>, summary: &mut VisitSummary, visitor: &mut F)
where
    F: FnMut(CacheResult<ArtifactCacheEntry>) -> color_eyre::Result<()>,
{
    if result.is_ok() {
        summary.entries += 1;
    } else {
        summary.entry_errors += 1;
    }

    if let Err(err) = visitor(result) {
        summary.visitor_errors += 1;
        warn!(
            target: CACHE_TARGET,
            error = %err,
            "artifact cache visitor failed, continuing scan"
        );
    }
}

/// Returns the sorted names of subdirectories of `dir` that are exactly
/// `name_len` lower-case hex characters.
fn shard_dirs(dir: &Utf8Path, name_len: usize) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let entry = dir_entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_shard_name(&name, name_len) || !entry.file_type()?.is_dir() {
            continue;
        }
        names.push(name);
    }
    names.sort_unstable();
    Ok(names)
}

fn is_shard_name(name: &str, name_len: usize) -> bool {
    name.len() == name_len
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ab", 2, true)]
    #[case("0f", 2, true)]
    #[case("AB", 2, false)]
    #[case("a", 2, false)]
    #[case("zz", 2, false)]
    #[case("abc", 2, false)]
    fn shard_names_are_lower_case_hex(
        #[case] name: &str,
        #[case] len: usize,
        #[case] expected: bool,
    ) {
        assert_eq!(is_shard_name(name, len), expected);
    }

    #[test]
    fn leaf_length_completes_the_digest() {
        assert_eq!(LEAF_LEN, 60);
    }
}
