//! Content-addressed artifact cache.
//!
//! Maps a `(type, JSON key)` pair to a directory tree of cached content.
//! Keys are canonicalised and hashed to locate an entry directory; file
//! content is deduplicated through a shared SHA-256 blob store and hard-linked
//! into each entry.
//!
//! # Cache Layout
//!
//! ```text
//! <root>/files/ab/cd/<60 hex>              blobs, named by content digest
//! <root>/artifacts/ab/cd/<60 hex>/         entries, named by key digest
//!     metadata.json  key  content/
//! ```
//!
//! # Cross-Process Coordination
//!
//! Inserts take an exclusive `flock(2)` on the entry directory, so concurrent
//! producers of the same key serialise while different keys proceed in
//! parallel. Lookups never lock: `metadata.json` is written last and renamed
//! into place, so a reader sees either no entry or a complete one.

mod config;
mod content;
mod digest;
mod key;
mod layout;
mod lock;
mod operations;

pub use config::{ArtifactCacheConfig, CacheEnvCfg, resolve_cache_dir};
pub use content::{ContentStore, LinkMode};
pub use digest::{SHA256_HEX_LEN, Sha256Digest};
pub use key::CanonicalKey;
pub use layout::CacheLayout;
pub use lock::{FileLock, LockMode};
pub use operations::VisitSummary;
pub(crate) use operations::copy_file_out;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Handle to a cache root.
///
/// Opening never touches the filesystem; errors surface from the first
/// operation that needs the root. The handle owns no open files between
/// calls and is cheap to clone.
///
/// # Examples
///
/// ```no_run
/// use artifact_cache::ArtifactCache;
/// use std::path::Path;
///
/// let cache = ArtifactCache::open("/var/cache/build-artifacts");
/// let key = r#"{"image":"core","format":"vhdx"}"#;
/// let entry = match cache.lookup("converted-image", key)? {
///     Some(entry) => entry,
///     None => cache.cache("converted-image", key, Path::new("/tmp/out/core.vhdx"))?,
/// };
/// println!("content at {}", entry.content_path());
/// # Ok::<(), artifact_cache::CacheError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    layout: CacheLayout,
    store: ContentStore,
}

impl ArtifactCache {
    /// Opens the cache rooted at `root`, hard-linking entry content.
    #[must_use]
    pub fn open(root: impl Into<Utf8PathBuf>) -> Self {
        Self::with_link_mode(root, LinkMode::default())
    }

    /// Opens the cache rooted at `root` using the given [`LinkMode`].
    #[must_use]
    pub fn with_link_mode(root: impl Into<Utf8PathBuf>, link_mode: LinkMode) -> Self {
        let layout = CacheLayout::new(root);
        let store = ContentStore::new(layout.clone(), link_mode);
        Self { layout, store }
    }

    /// Opens the cache described by a resolved configuration.
    #[must_use]
    pub fn from_config(config: &ArtifactCacheConfig) -> Self {
        Self::with_link_mode(config.cache_dir.clone(), config.link_mode)
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.layout.root()
    }

    /// Returns the path layout of this cache.
    #[must_use]
    pub const fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Returns the blob store backing this cache.
    #[must_use]
    pub const fn content_store(&self) -> &ContentStore {
        &self.store
    }
}

/// Contents of an entry's `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Artifact type the entry was cached under.
    #[serde(rename = "type", default)]
    pub artifact_type: String,
}

/// View over a complete cache entry on disk.
///
/// The entry stays valid until another writer replaces the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCacheEntry {
    entry_dir: Utf8PathBuf,
    content_path: Utf8PathBuf,
    artifact_type: String,
    digest: Sha256Digest,
}

impl ArtifactCacheEntry {
    /// Returns the directory holding the cached artifact tree.
    #[must_use]
    pub fn content_path(&self) -> &Utf8Path {
        &self.content_path
    }

    /// Returns the entry directory containing `metadata.json`, `key`, and
    /// `content/`.
    #[must_use]
    pub fn entry_dir(&self) -> &Utf8Path {
        &self.entry_dir
    }

    /// Returns the artifact type recorded in the entry metadata.
    #[must_use]
    pub fn artifact_type(&self) -> &str {
        &self.artifact_type
    }

    /// Returns the digest of the canonical key addressing this entry.
    #[must_use]
    pub const fn digest(&self) -> &Sha256Digest {
        &self.digest
    }
}
