//! Aggregate statistics over a cache root.

use tracing::{debug, warn};

use crate::cache::ArtifactCache;
use crate::error::CacheResult;
use crate::fs::best_effort_tree_size;
use crate::observability::LOG_TARGET;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Entry count and apparent size of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of complete entries.
    pub entries: usize,
    /// Number of malformed entries skipped during the scan.
    pub errors: usize,
    /// Sum of the sizes of all files in every entry's `content/` tree.
    ///
    /// Blobs shared between entries are counted once per entry.
    pub bytes: u64,
}

impl CacheStats {
    /// Scans every entry in `cache`.
    ///
    /// Unreadable files inside an entry are skipped, so `bytes` is a lower
    /// bound when parts of the cache are inaccessible.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache's `artifacts/` directory exists but
    /// cannot be read.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use artifact_cache::{ArtifactCache, stats::CacheStats};
    ///
    /// let stats = CacheStats::collect(&ArtifactCache::open("/var/cache/build-artifacts"))?;
    /// println!("{} entries, {:.2} MiB", stats.entries, stats.size_mib());
    /// # Ok::<(), artifact_cache::CacheError>(())
    /// ```
    pub fn collect(cache: &ArtifactCache) -> CacheResult<Self> {
        let mut stats = Self::default();
        cache.visit_all(|visited| {
            match visited {
                Ok(entry) => {
                    stats.entries += 1;
                    stats.bytes += best_effort_tree_size(entry.content_path().as_std_path());
                }
                Err(err) => {
                    stats.errors += 1;
                    warn!(target: LOG_TARGET, error = %err, "skipping malformed cache entry");
                }
            }
            Ok(())
        })?;

        debug!(
            target: LOG_TARGET,
            root = %cache.root(),
            entries = stats.entries,
            errors = stats.errors,
            bytes = stats.bytes,
            "collected cache statistics"
        );
        Ok(stats)
    }

    /// Returns [`CacheStats::bytes`] in mebibytes.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "sizes beyond 2^53 bytes only lose display precision"
    )]
    #[expect(clippy::float_arithmetic, reason = "converting a byte count for display")]
    pub fn size_mib(&self) -> f64 {
        self.bytes as f64 / BYTES_PER_MIB
    }
}
