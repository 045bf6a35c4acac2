//! SHA-256 digests used to address blobs and artifact entries.

use color_eyre::eyre::eyre;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{CacheError, CacheResult};

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Size of the read buffer used when hashing files.
const HASH_CHUNK_SIZE: usize = 8192;

/// A validated, lower-case, hex-encoded SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Parses a hex digest, normalising upper-case characters.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgument`](crate::CacheErrorKind::InvalidArgument)
    /// error unless `hex` is exactly 64 ASCII hex characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_cache::Sha256Digest;
    ///
    /// let digest = Sha256Digest::parse(
    ///     "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824",
    /// )?;
    /// assert!(digest.as_str().starts_with("2cf24dba"));
    /// # Ok::<(), artifact_cache::CacheError>(())
    /// ```
    pub fn parse(hex: &str) -> CacheResult<Self> {
        if hex.len() != SHA256_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CacheError::invalid_argument(eyre!(
                "invalid SHA-256 digest '{hex}': expected {SHA256_HEX_LEN} hex characters"
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Hashes an in-memory byte sequence.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Hashes a file's contents using chunked streaming I/O.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened or read.
    #[expect(
        clippy::indexing_slicing,
        reason = "bytes_read is always <= buffer.len()"
    )]
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; HASH_CHUNK_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Returns the digest as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the digest into its two shard levels and the leaf name.
    ///
    /// The split is `2/2/60`, matching the on-disk layout of both the blob
    /// store and the artifact entries.
    #[must_use]
    pub fn shards(&self) -> (&str, &str, &str) {
        let (first, rest) = self.0.split_at(2);
        let (second, leaf) = rest.split_at(2);
        (first, second, leaf)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheErrorKind;
    use rstest::rstest;
    use tempfile::tempdir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn of_bytes_matches_known_vector() {
        assert_eq!(Sha256Digest::of_bytes(b"hello").as_str(), HELLO_SHA256);
    }

    #[test]
    fn of_file_matches_of_bytes() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, "hello").expect("write");

        let digest = Sha256Digest::of_file(&path).expect("hash file");
        assert_eq!(digest.as_str(), HELLO_SHA256);
    }

    #[test]
    fn of_file_handles_content_larger_than_one_chunk() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("big.bin");
        let content = vec![7u8; HASH_CHUNK_SIZE * 3 + 11];
        std::fs::write(&path, &content).expect("write");

        let digest = Sha256Digest::of_file(&path).expect("hash file");
        assert_eq!(digest, Sha256Digest::of_bytes(&content));
    }

    #[test]
    fn parse_normalises_case() {
        let digest = Sha256Digest::parse(&HELLO_SHA256.to_ascii_uppercase()).expect("parse");
        assert_eq!(digest.as_str(), HELLO_SHA256);
    }

    #[rstest]
    #[case::empty("")]
    #[case::too_short("2cf24dba")]
    #[case::too_long("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b98240")]
    #[case::not_hex("zzf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")]
    fn parse_rejects_malformed_digests(#[case] input: &str) {
        let err = Sha256Digest::parse(input).expect_err("malformed digest must fail");
        assert_eq!(err.kind(), CacheErrorKind::InvalidArgument);
    }

    #[test]
    fn shards_split_two_two_sixty() {
        let digest = Sha256Digest::parse(HELLO_SHA256).expect("parse");
        let (first, second, leaf) = digest.shards();
        assert_eq!(first, "2c");
        assert_eq!(second, "f2");
        assert_eq!(leaf.len(), 60);
        assert_eq!(format!("{first}{second}{leaf}"), HELLO_SHA256);
    }
}
