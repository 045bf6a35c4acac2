//! Shared tracing configuration for observability instrumentation.
//!
//! Centralises the log targets used by the crate so subscribers can filter
//! cache events without pulling in unrelated application logs.

/// Prefix shared by every target this crate logs under.
pub(crate) const CRATE_TARGET: &str = "artifact_cache";

/// Target used by artifact cache lookups, inserts, and scans.
pub(crate) const CACHE_TARGET: &str = "artifact_cache::cache";

/// Target used by the download cache specialisation.
pub(crate) const DOWNLOAD_TARGET: &str = "artifact_cache::download";

/// Target used by the statistics collector and the `cachectl` front end.
pub(crate) const LOG_TARGET: &str = "artifact_cache::observability";
