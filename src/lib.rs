//! Content-addressed cache for build artifacts.
//!
//! An artifact is identified by a short type string and a caller-supplied JSON
//! key. The cache stores the artifact's file tree once per key and every file
//! once per distinct content, hard-linking identical files between entries.
//! Producers coordinate through `flock(2)` on each entry directory, so any
//! number of threads or processes can share one cache root.
//!
//! [`download::DownloadCache`] specialises the cache to URI-keyed downloads
//! and [`stats::CacheStats`] summarises a cache root for tooling.

mod cache;
pub mod download;
mod error;
mod fs;
mod observability;
pub mod stats;
#[doc(hidden)]
pub mod test_support;

pub use cache::{
    ArtifactCache, ArtifactCacheConfig, ArtifactCacheEntry, CacheEnvCfg, CacheLayout,
    CanonicalKey, ContentStore, EntryMetadata, FileLock, LinkMode, LockMode, SHA256_HEX_LEN,
    Sha256Digest, VisitSummary, resolve_cache_dir,
};
pub use error::{CacheError, CacheErrorKind, CacheResult, ConfigError, ConfigResult};
