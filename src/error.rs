//! Domain error types for the artifact cache.

use color_eyre::Report;
use thiserror::Error;

/// Result alias for cache operations that may return a [`CacheError`].
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Categorises cache failures so callers can branch on structured errors.
///
/// A missing entry is never an error: lookups report absence as `Ok(None)`.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum CacheErrorKind {
    /// An underlying filesystem or lock operation failed.
    #[default]
    Io,
    /// The caller supplied an empty type or key, a malformed digest, or
    /// content the cache cannot import.
    InvalidArgument,
    /// The caller-supplied key is not valid JSON or cannot be canonicalised.
    InvalidKey,
    /// The on-disk cache violates one of its own invariants.
    Corruption,
}

/// Captures cache failures together with their diagnostic report.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct CacheError {
    kind: CacheErrorKind,
    #[source]
    report: Report,
}

impl CacheError {
    /// Constructs a new cache error with the provided kind and diagnostic
    /// report.
    #[must_use]
    pub const fn new(kind: CacheErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Builds an [`CacheErrorKind::InvalidArgument`] error.
    #[must_use]
    pub const fn invalid_argument(report: Report) -> Self {
        Self::new(CacheErrorKind::InvalidArgument, report)
    }

    /// Builds an [`CacheErrorKind::InvalidKey`] error.
    #[must_use]
    pub const fn invalid_key(report: Report) -> Self {
        Self::new(CacheErrorKind::InvalidKey, report)
    }

    /// Builds a [`CacheErrorKind::Corruption`] error.
    #[must_use]
    pub const fn corruption(report: Report) -> Self {
        Self::new(CacheErrorKind::Corruption, report)
    }

    /// Returns the semantic category for this failure.
    #[must_use]
    pub const fn kind(&self) -> CacheErrorKind {
        self.kind
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }
}

impl From<Report> for CacheError {
    fn from(report: Report) -> Self {
        Self::new(CacheErrorKind::Io, report)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::new(CacheErrorKind::Io, Report::new(err))
    }
}

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);
