//! On-disk layout of a cache root.
//!
//! ```text
//! <root>/files/<h0h1>/<h2h3>/<h4..h63>              immutable blobs
//! <root>/artifacts/<h0h1>/<h2h3>/<h4..h63>/         one entry per canonical key
//!     metadata.json                                 written last
//!     key                                           canonical key text
//!     content/                                      hard links into files/
//! ```

use camino::{Utf8Path, Utf8PathBuf};

use super::digest::Sha256Digest;

/// Name of the blob store subtree.
pub(crate) const FILES_DIR: &str = "files";
/// Name of the artifact entry subtree.
pub(crate) const ARTIFACTS_DIR: &str = "artifacts";
/// Metadata file whose validity marks an entry as complete.
pub(crate) const METADATA_FILENAME: &str = "metadata.json";
/// Debug copy of the canonical key.
pub(crate) const KEY_FILENAME: &str = "key";
/// Directory mirroring the cached artifact's tree.
pub(crate) const CONTENT_DIRNAME: &str = "content";

/// Resolves the paths making up a cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: Utf8PathBuf,
}

impl CacheLayout {
    /// Creates a layout rooted at `root`. Nothing is touched on disk.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the blob store directory.
    #[must_use]
    pub fn files_dir(&self) -> Utf8PathBuf {
        self.root.join(FILES_DIR)
    }

    /// Returns the artifact entry directory.
    #[must_use]
    pub fn artifacts_dir(&self) -> Utf8PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    /// Returns the path a blob with the given content digest lives at.
    #[must_use]
    pub fn blob_path(&self, digest: &Sha256Digest) -> Utf8PathBuf {
        let (first, second, leaf) = digest.shards();
        self.files_dir().join(first).join(second).join(leaf)
    }

    /// Returns the entry directory for the given canonical key digest.
    #[must_use]
    pub fn entry_dir(&self, digest: &Sha256Digest) -> Utf8PathBuf {
        let (first, second, leaf) = digest.shards();
        self.artifacts_dir().join(first).join(second).join(leaf)
    }
}

/// Returns the metadata path inside an entry directory.
pub(crate) fn metadata_path(entry_dir: &Utf8Path) -> Utf8PathBuf {
    entry_dir.join(METADATA_FILENAME)
}

/// Returns the content path inside an entry directory.
pub(crate) fn content_path(entry_dir: &Utf8Path) -> Utf8PathBuf {
    entry_dir.join(CONTENT_DIRNAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn blob_and_entry_paths_share_sharding() {
        let layout = CacheLayout::new("/cache");
        let digest = Sha256Digest::parse(DIGEST).expect("digest");

        assert_eq!(
            layout.blob_path(&digest),
            Utf8PathBuf::from(concat!(
                "/cache/files/2c/f2/",
                "4dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            ))
        );
        assert_eq!(
            layout.entry_dir(&digest),
            Utf8PathBuf::from(concat!(
                "/cache/artifacts/2c/f2/",
                "4dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            ))
        );
    }

    #[test]
    fn entry_children_are_named_consistently() {
        let entry = Utf8Path::new("/cache/artifacts/aa/bb/cc");
        assert_eq!(metadata_path(entry), entry.join("metadata.json"));
        assert_eq!(content_path(entry), entry.join("content"));
    }
}
